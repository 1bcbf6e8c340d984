use std::time::Duration;

use log::warn;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use steward_shared::{ApiError, Message, Task, ToolCall};

/// Bounded wait for the task listing. Expiry renders as "backend
/// unreachable" instead of failing the dashboard.
const TASKS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub response: String,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize, Debug)]
struct ConversationMessages {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Deserialize, Debug)]
struct ConversationHead {
    id: String,
}

/// Task listing result. `backend_connected` is false only when no response
/// arrived at all.
#[derive(Debug)]
pub struct TaskFetch {
    pub data: Vec<Task>,
    pub backend_connected: bool,
}

#[derive(Serialize)]
struct CreateTaskBody<'a> {
    title: &'a str,
}

#[derive(Serialize)]
struct UpdateTaskBody<'a> {
    title: &'a str,
    completed: bool,
}

#[derive(Serialize)]
struct ToggleBody {
    completed: bool,
}

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    tasks_timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            tasks_timeout: TASKS_TIMEOUT,
        }
    }

    fn url(&self, user_id: &str, rest: &str) -> String {
        format!("{}/api/v1/{}/{}", self.base_url, user_id, rest)
    }

    pub async fn send_chat(
        &self,
        user_id: &str,
        token: &str,
        conversation_id: Option<&str>,
        message: &str,
    ) -> Result<ChatResponse, ApiError> {
        let request = ChatRequest {
            message: message.to_string(),
            conversation_id: conversation_id.map(str::to_string),
        };

        let response = self
            .client
            .post(self.url(user_id, "chat"))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(ApiError::Unreachable)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::SessionExpired);
        }
        if !status.is_success() {
            return Err(rejection(response).await);
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    pub async fn conversation_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
        token: &str,
    ) -> Result<Vec<Message>, ApiError> {
        let url = self.url(user_id, &format!("conversations/{}/messages", conversation_id));

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(ApiError::Unreachable)?;

        let status = response.status();
        // A stale cached id shows up as 404 (deleted) or 403 (someone
        // else's conversation); both mean "drop the cached id".
        if status == StatusCode::NOT_FOUND || status == StatusCode::FORBIDDEN {
            return Err(ApiError::ConversationGone);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::SessionExpired);
        }
        if !status.is_success() {
            return Err(rejection(response).await);
        }

        match response.json::<ConversationMessages>().await {
            Ok(body) => Ok(body.messages),
            Err(e) => {
                warn!("failed to parse conversation history: {}", e);
                Ok(Vec::new())
            }
        }
    }

    /// The user's most recent conversation id, or None when the backend
    /// answers 204.
    pub async fn recent_conversation(
        &self,
        user_id: &str,
        token: &str,
    ) -> Result<Option<String>, ApiError> {
        let response = self
            .client
            .get(self.url(user_id, "conversations/recent"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(ApiError::Unreachable)?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::SessionExpired);
        }
        if !status.is_success() {
            return Err(rejection(response).await);
        }

        response
            .json::<ConversationHead>()
            .await
            .map(|head| Some(head.id))
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    pub async fn list_tasks(&self, user_id: &str, token: &str) -> TaskFetch {
        let result = self
            .client
            .get(self.url(user_id, "tasks"))
            .bearer_auth(token)
            .timeout(self.tasks_timeout)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!("task fetch got no response: {}", e);
                return TaskFetch { data: Vec::new(), backend_connected: false };
            }
        };

        if !response.status().is_success() {
            // Backend is up but refused; the dashboard still renders.
            warn!("task fetch rejected: HTTP {}", response.status());
            return TaskFetch { data: Vec::new(), backend_connected: true };
        }

        match response.json::<Vec<Task>>().await {
            Ok(tasks) => TaskFetch { data: tasks, backend_connected: true },
            Err(e) => {
                warn!("task fetch body did not decode: {}", e);
                TaskFetch { data: Vec::new(), backend_connected: false }
            }
        }
    }

    pub async fn create_task(
        &self,
        user_id: &str,
        token: &str,
        title: &str,
    ) -> Result<Task, ApiError> {
        let response = self
            .client
            .post(self.url(user_id, "tasks"))
            .bearer_auth(token)
            .json(&CreateTaskBody { title })
            .send()
            .await
            .map_err(ApiError::Unreachable)?;

        decode_task(response).await
    }

    pub async fn update_task(
        &self,
        user_id: &str,
        token: &str,
        task_id: &str,
        title: &str,
        completed: bool,
    ) -> Result<Task, ApiError> {
        let response = self
            .client
            .put(self.url(user_id, &format!("tasks/{}", task_id)))
            .bearer_auth(token)
            .json(&UpdateTaskBody { title, completed })
            .send()
            .await
            .map_err(ApiError::Unreachable)?;

        decode_task(response).await
    }

    pub async fn delete_task(
        &self,
        user_id: &str,
        token: &str,
        task_id: &str,
    ) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.url(user_id, &format!("tasks/{}", task_id)))
            .bearer_auth(token)
            .send()
            .await
            .map_err(ApiError::Unreachable)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::SessionExpired);
        }
        if !status.is_success() {
            return Err(rejection(response).await);
        }
        Ok(())
    }

    pub async fn toggle_complete(
        &self,
        user_id: &str,
        token: &str,
        task_id: &str,
        completed: bool,
    ) -> Result<Task, ApiError> {
        let response = self
            .client
            .patch(self.url(user_id, &format!("tasks/{}/complete", task_id)))
            .bearer_auth(token)
            .json(&ToggleBody { completed })
            .send()
            .await
            .map_err(ApiError::Unreachable)?;

        decode_task(response).await
    }
}

async fn decode_task(response: reqwest::Response) -> Result<Task, ApiError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::SessionExpired);
    }
    if !status.is_success() {
        return Err(rejection(response).await);
    }
    response
        .json::<Task>()
        .await
        .map_err(|e| ApiError::Parse(e.to_string()))
}

/// Pull the server's `detail` string out of an error body, falling back to
/// the bare status.
async fn rejection(response: reqwest::Response) -> ApiError {
    let status = response.status();
    let detail = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| Some(body.get("detail")?.as_str()?.to_string()))
        .unwrap_or_else(|| format!("HTTP {}", status));
    ApiError::Rejected(detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client_for(server: &mockito::ServerGuard) -> ApiClient {
        ApiClient::new(server.url())
    }

    #[tokio::test]
    async fn first_send_omits_conversation_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/u1/chat")
            .match_header("authorization", "Bearer tok")
            .match_body(mockito::Matcher::Json(json!({
                "message": "Add a task to buy groceries"
            })))
            .with_status(200)
            .with_body(
                json!({
                    "conversation_id": "c1",
                    "response": "Added!",
                    "tool_calls": [{"tool": "add_task", "params": {}, "result": {}}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let reply = client_for(&server)
            .send_chat("u1", "tok", None, "Add a task to buy groceries")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(reply.conversation_id, "c1");
        assert_eq!(reply.response, "Added!");
        assert_eq!(reply.tool_calls.unwrap()[0].tool, "add_task");
    }

    #[tokio::test]
    async fn send_continues_existing_conversation() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/u1/chat")
            .match_body(mockito::Matcher::Json(json!({
                "message": "and milk",
                "conversation_id": "c1"
            })))
            .with_status(200)
            .with_body(json!({"conversation_id": "c1", "response": "Done."}).to_string())
            .create_async()
            .await;

        let reply = client_for(&server)
            .send_chat("u1", "tok", Some("c1"), "and milk")
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(reply.tool_calls.is_none());
    }

    #[tokio::test]
    async fn expired_session_is_distinct_from_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/u1/chat")
            .with_status(401)
            .create_async()
            .await;

        let err = client_for(&server)
            .send_chat("u1", "tok", None, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::SessionExpired));
    }

    #[tokio::test]
    async fn rejection_carries_server_detail() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/u1/chat")
            .with_status(422)
            .with_body(json!({"detail": "message must not be empty"}).to_string())
            .create_async()
            .await;

        let err = client_for(&server)
            .send_chat("u1", "tok", None, "")
            .await
            .unwrap_err();
        match err {
            ApiError::Rejected(detail) => assert_eq!(detail, "message must not be empty"),
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn rejection_without_body_falls_back_to_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/u1/chat")
            .with_status(500)
            .create_async()
            .await;

        let err = client_for(&server)
            .send_chat("u1", "tok", None, "hi")
            .await
            .unwrap_err();
        match err {
            ApiError::Rejected(detail) => assert_eq!(detail, "HTTP 500 Internal Server Error"),
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_history_maps_to_conversation_gone() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/u1/conversations/c9/messages")
            .with_status(404)
            .create_async()
            .await;

        let err = client_for(&server)
            .conversation_messages("u1", "c9", "tok")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ConversationGone));
    }

    #[tokio::test]
    async fn forbidden_history_also_maps_to_conversation_gone() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/u1/conversations/c9/messages")
            .with_status(403)
            .create_async()
            .await;

        let err = client_for(&server)
            .conversation_messages("u1", "c9", "tok")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ConversationGone));
    }

    #[tokio::test]
    async fn history_preserves_server_order() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/u1/conversations/c1/messages")
            .with_status(200)
            .with_body(
                json!({"messages": [
                    {"id": "m1", "role": "user", "content": "first", "timestamp": "2025-06-01T10:30:00Z"},
                    {"id": "m2", "role": "assistant", "content": "second", "timestamp": "2025-06-01T10:30:02Z"}
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let messages = client_for(&server)
            .conversation_messages("u1", "c1", "tok")
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[1].content, "second");
    }

    #[tokio::test]
    async fn recent_conversation_handles_204() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/u1/conversations/recent")
            .with_status(204)
            .create_async()
            .await;

        let recent = client_for(&server).recent_conversation("u1", "tok").await.unwrap();
        assert!(recent.is_none());
    }

    #[tokio::test]
    async fn recent_conversation_returns_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/u1/conversations/recent")
            .with_status(200)
            .with_body(json!({"id": "c7", "title": "groceries"}).to_string())
            .create_async()
            .await;

        let recent = client_for(&server).recent_conversation("u1", "tok").await.unwrap();
        assert_eq!(recent.as_deref(), Some("c7"));
    }

    #[tokio::test]
    async fn tasks_fetch_degrades_when_nothing_listens() {
        // Port is bound then dropped, so the connect is refused.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ApiClient::new(format!("http://{}", addr));
        let fetch = client.list_tasks("u1", "tok").await;
        assert!(fetch.data.is_empty());
        assert!(!fetch.backend_connected);
    }

    #[tokio::test]
    async fn tasks_fetch_times_out_against_silent_backend() {
        // Accepting listener that never writes a response.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _socket = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let mut client = ApiClient::new(format!("http://{}", addr));
        client.tasks_timeout = Duration::from_millis(100);
        let fetch = client.list_tasks("u1", "tok").await;
        assert!(fetch.data.is_empty());
        assert!(!fetch.backend_connected);
    }

    #[tokio::test]
    async fn tasks_fetch_reports_backend_up_on_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/u1/tasks")
            .with_status(500)
            .create_async()
            .await;

        let fetch = client_for(&server).list_tasks("u1", "tok").await;
        assert!(fetch.data.is_empty());
        assert!(fetch.backend_connected);
    }

    #[tokio::test]
    async fn task_crud_round() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/u1/tasks")
            .match_body(mockito::Matcher::Json(json!({"title": "buy milk"})))
            .with_status(200)
            .with_body(json!({"id": "t1", "title": "buy milk", "completed": false}).to_string())
            .create_async()
            .await;
        server
            .mock("PATCH", "/api/v1/u1/tasks/t1/complete")
            .match_body(mockito::Matcher::Json(json!({"completed": true})))
            .with_status(200)
            .with_body(json!({"id": "t1", "title": "buy milk", "completed": true}).to_string())
            .create_async()
            .await;
        server
            .mock("DELETE", "/api/v1/u1/tasks/t1")
            .with_status(204)
            .create_async()
            .await;

        let client = client_for(&server);
        let task = client.create_task("u1", "tok", "buy milk").await.unwrap();
        assert_eq!(task.id, "t1");

        let task = client.toggle_complete("u1", "tok", "t1", true).await.unwrap();
        assert!(task.completed);

        client.delete_task("u1", "tok", "t1").await.unwrap();
    }
}
