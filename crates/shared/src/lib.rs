pub mod error;
pub mod types;

pub use error::ApiError;
pub use types::{Message, Role, Task, ToolCall};
