use steward_shared::{ApiError, Task};

use crate::client::ApiClient;

/// Transient copy of the backend's task list, kept only for rendering and
/// optimistic updates. The backend owns the data.
pub struct TaskBoard {
    tasks: Vec<Task>,
    backend_connected: bool,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self { tasks: Vec::new(), backend_connected: true }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn backend_connected(&self) -> bool {
        self.backend_connected
    }

    /// (total, completed, pending)
    pub fn summary(&self) -> (usize, usize, usize) {
        let completed = self.tasks.iter().filter(|t| t.completed).count();
        (self.tasks.len(), completed, self.tasks.len() - completed)
    }

    pub async fn refresh(&mut self, client: &ApiClient, user_id: &str, token: &str) {
        let fetch = client.list_tasks(user_id, token).await;
        self.tasks = fetch.data;
        self.backend_connected = fetch.backend_connected;
    }

    pub async fn add(
        &mut self,
        client: &ApiClient,
        user_id: &str,
        token: &str,
        title: &str,
    ) -> Result<(), ApiError> {
        let task = client.create_task(user_id, token, title).await?;
        self.tasks.push(task);
        Ok(())
    }

    /// Optimistic toggle: flip locally first, revert if the backend says no.
    pub async fn toggle(
        &mut self,
        client: &ApiClient,
        user_id: &str,
        token: &str,
        index: usize,
    ) -> Result<(), ApiError> {
        let Some(current) = self.tasks.get(index).cloned() else {
            return Ok(());
        };
        let target = !current.completed;
        self.tasks[index].completed = target;

        match client.toggle_complete(user_id, token, &current.id, target).await {
            Ok(task) => {
                self.tasks[index] = task;
                Ok(())
            }
            Err(err) => {
                self.tasks[index] = current;
                Err(err)
            }
        }
    }

    /// Optimistic delete: drop locally first, restore on failure.
    pub async fn remove(
        &mut self,
        client: &ApiClient,
        user_id: &str,
        token: &str,
        index: usize,
    ) -> Result<(), ApiError> {
        if index >= self.tasks.len() {
            return Ok(());
        }
        let removed = self.tasks.remove(index);

        match client.delete_task(user_id, token, &removed.id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.tasks.insert(index, removed);
                Err(err)
            }
        }
    }

    pub async fn edit(
        &mut self,
        client: &ApiClient,
        user_id: &str,
        token: &str,
        index: usize,
        title: &str,
    ) -> Result<(), ApiError> {
        let Some(current) = self.tasks.get(index).cloned() else {
            return Ok(());
        };

        let task = client
            .update_task(user_id, token, &current.id, title, current.completed)
            .await?;
        self.tasks[index] = task;
        Ok(())
    }
}
