use log::{error, info, warn};
use steward_shared::{ApiError, Message, Role, ToolCall};
use uuid::Uuid;

use crate::client::ApiClient;
use crate::store::LocalStore;

/// Tools whose successful execution means the task list is stale.
const TASK_TOOLS: [&str; 4] = ["add_task", "complete_task", "delete_task", "update_task"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sending,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { tasks_changed: bool },
    Failed,
    Ignored,
}

/// Chat view state for one user. The durable mirror lives in `LocalStore`,
/// always passed in by the caller; after any successful send or history
/// load the in-memory conversation id and the stored one agree.
pub struct ChatSession {
    user_id: String,
    token: String,
    messages: Vec<Message>,
    phase: Phase,
    error: Option<String>,
    conversation_id: Option<String>,
    open: bool,
    /// Conversation id whose history is already in `messages`. Guards
    /// against redundant reloads of the same conversation.
    history_loaded: Option<String>,
}

impl ChatSession {
    pub fn new(user_id: &str, token: &str, store: &LocalStore) -> Self {
        Self {
            user_id: user_id.to_string(),
            token: token.to_string(),
            messages: Vec::new(),
            phase: Phase::Idle,
            error: None,
            conversation_id: store.conversation_id(user_id).map(str::to_string),
            open: false,
            history_loaded: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn clear_error(&mut self) {
        self.error = None;
        if self.phase == Phase::Error {
            self.phase = Phase::Idle;
        }
    }

    /// Optimistic send: the user message is appended before the call and
    /// removed again if the call fails. The conversation id is only ever
    /// advanced on success.
    pub async fn send(
        &mut self,
        client: &ApiClient,
        store: &mut LocalStore,
        text: &str,
    ) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() || self.phase == Phase::Sending {
            return SendOutcome::Ignored;
        }

        let user_message = Message {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: text.to_string(),
            timestamp: clock_stamp(),
            tool_calls: None,
        };
        let optimistic_id = user_message.id.clone();
        self.messages.push(user_message);
        self.phase = Phase::Sending;
        self.error = None;

        match client
            .send_chat(&self.user_id, &self.token, self.conversation_id.as_deref(), text)
            .await
        {
            Ok(reply) => {
                self.conversation_id = Some(reply.conversation_id.clone());
                self.history_loaded = Some(reply.conversation_id.clone());
                if let Err(e) = store.set_conversation_id(&self.user_id, &reply.conversation_id) {
                    warn!("could not persist conversation id: {}", e);
                }

                let tasks_changed = task_refresh_signal(reply.tool_calls.as_deref().unwrap_or(&[]));

                self.messages.push(Message {
                    id: Uuid::new_v4().to_string(),
                    role: Role::Assistant,
                    content: reply.response,
                    timestamp: clock_stamp(),
                    tool_calls: reply.tool_calls,
                });
                self.phase = Phase::Idle;
                SendOutcome::Sent { tasks_changed }
            }
            Err(err) => {
                error!("chat send failed: {}", err);
                self.messages.retain(|m| m.id != optimistic_id);
                self.error = Some(err.user_message());
                self.phase = Phase::Error;
                SendOutcome::Failed
            }
        }
    }

    /// Replace the message list with the server's ordered history. Never
    /// merges. Skipped while a send is in flight (the optimistic message is
    /// not on the server yet) and when this conversation is already loaded,
    /// unless `force` is set.
    pub async fn load_history(&mut self, client: &ApiClient, store: &mut LocalStore, force: bool) {
        if self.phase == Phase::Sending {
            return;
        }

        let Some(cid) = self.conversation_id.clone() else {
            return;
        };

        if !force && self.history_loaded.as_deref() == Some(cid.as_str()) {
            return;
        }

        match client.conversation_messages(&self.user_id, &cid, &self.token).await {
            Ok(history) => {
                self.messages = history.into_iter().map(restamp).collect();
                self.history_loaded = Some(cid);
            }
            Err(ApiError::ConversationGone) => {
                // Stale cached id: drop it everywhere and start fresh,
                // without surfacing an error.
                info!("cached conversation {} is gone, starting fresh", cid);
                self.conversation_id = None;
                self.history_loaded = None;
                self.messages.clear();
                if let Err(e) = store.clear_conversation(&self.user_id) {
                    warn!("could not clear stored conversation id: {}", e);
                }
            }
            Err(err) => {
                error!("failed to load conversation history: {}", err);
            }
        }
    }

    /// Open the chat panel. With no active conversation, fall back to the
    /// backend's most recent one; its absence is not an error.
    pub async fn open(&mut self, client: &ApiClient, store: &mut LocalStore) {
        self.open = true;

        if !self.messages.is_empty() {
            return;
        }

        if self.conversation_id.is_some() {
            self.load_history(client, store, true).await;
        }

        if self.conversation_id.is_none() {
            match client.recent_conversation(&self.user_id, &self.token).await {
                Ok(Some(id)) => {
                    self.conversation_id = Some(id.clone());
                    if let Err(e) = store.set_conversation_id(&self.user_id, &id) {
                        warn!("could not persist conversation id: {}", e);
                    }
                    self.load_history(client, store, true).await;
                }
                Ok(None) => {}
                Err(err) => {
                    // Fine to continue with a brand-new conversation.
                    info!("recent conversation lookup failed: {}", err);
                }
            }
        }
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    /// Reset every field and drop the durable conversation id.
    pub fn clear(&mut self, store: &mut LocalStore) {
        self.messages.clear();
        self.error = None;
        self.phase = Phase::Idle;
        self.conversation_id = None;
        self.history_loaded = None;
        if let Err(e) = store.clear_conversation(&self.user_id) {
            warn!("could not clear stored conversation id: {}", e);
        }
    }

    #[cfg(test)]
    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }
}

fn task_refresh_signal(calls: &[ToolCall]) -> bool {
    calls.iter().any(|call| {
        TASK_TOOLS.contains(&call.tool.as_str()) && call.result.get("error").is_none()
    })
}

fn clock_stamp() -> String {
    chrono::Local::now().format("%H:%M").to_string()
}

/// History rows arrive with wire instants; the display form is HH:MM.
fn restamp(mut message: Message) -> Message {
    if let Ok(instant) = chrono::DateTime::parse_from_rfc3339(&message.timestamp) {
        message.timestamp = instant.with_timezone(&chrono::Local).format("%H:%M").to_string();
    }
    message
}
