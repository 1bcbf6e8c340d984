use thiserror::Error;

/// Failure taxonomy for every backend call. Variants are chosen by the
/// caller from the HTTP outcome; `user_message` maps them to the strings
/// shown in the chat panel.
#[derive(Debug, Error)]
pub enum ApiError {
    /// 401/403 on an authenticated call.
    #[error("session expired")]
    SessionExpired,

    /// No response at all (connect failure, timeout).
    #[error("backend unreachable")]
    Unreachable(#[source] reqwest::Error),

    /// 404/403 on a conversation history fetch. The cached conversation id
    /// is stale and must be dropped.
    #[error("conversation not found")]
    ConversationGone,

    /// Any other non-2xx, carrying the server's `detail` string when the
    /// body had one, else the HTTP status.
    #[error("{0}")]
    Rejected(String),

    /// 2xx with a body that did not decode.
    #[error("malformed response body: {0}")]
    Parse(String),
}

impl ApiError {
    pub fn user_message(&self) -> String {
        match self {
            ApiError::SessionExpired => {
                "Your session has expired. Please refresh and log in again.".to_string()
            }
            ApiError::Unreachable(_) => {
                "Unable to reach the server. Please check your connection and try again.".to_string()
            }
            ApiError::ConversationGone => {
                "That conversation is no longer available.".to_string()
            }
            ApiError::Rejected(detail) => detail.clone(),
            ApiError::Parse(_) => {
                "Something went wrong. Please try again in a moment.".to_string()
            }
        }
    }
}
