//! Conversation types and the model gateway contract.

pub mod errors;
pub mod types;

pub use errors::ModelError;
pub use types::{
    Backend, ModelReply, ModelRequest, ModelResponse, ParamKind, ParamSpec, Role, ToolCall,
    ToolSpec, Turn, Usage,
};
