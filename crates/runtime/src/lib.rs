//! Musezen runtime: the art curator's agent loop and everything it touches.
//!
//! # Overview
//!
//! - **Transcript**: append-only log of user, assistant, tool and system turns.
//! - **ToolRegistry**: named tools with parameter schemas, dispatched by name.
//! - **Backend**: the model gateway contract; [`OpenAiBackend`] speaks the
//!   chat-completions wire format and [`GuardedBackend`] adds a prompt budget
//!   and reply moderation on top of any backend.
//! - **Agent**: drives one user turn through as many model/tool round-trips as
//!   needed, bounded and cancellable.
//! - **Session**: a chat front-end's view of an agent, with reset, the
//!   single-use painting style context, and an audit log.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use runtime::{OpenAiBackend, Session, SessionOptions, ToolRegistry};
//! use storage::EventStore;
//!
//! # async fn example() -> runtime::Result<()> {
//! let backend = Arc::new(OpenAiBackend::builder("sk-...", "gpt-4o-mini").build());
//! let tools = Arc::new(ToolRegistry::new());
//! let store = EventStore::in_memory()?;
//!
//! let mut session = Session::new(store, backend, tools, SessionOptions::default())?;
//! let reply = session.chat("Show me some Impressionism").await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

mod agent;
mod error;
pub mod guard;
pub mod model;
pub mod providers;
mod session;
pub mod style;
pub mod tools;
mod transcript;

pub use agent::{
    Agent, AgentConfig, AgentError, DEFAULT_MAX_ROUND_TRIPS, ROUND_TRIP_LIMIT_MESSAGE,
    RespondContext,
};
pub use error::{Error, Result};
pub use guard::{
    BackendModerator, DEFAULT_MAX_PROMPT_TOKENS, GuardedBackend, Moderator, UNSAFE_REPLY_MESSAGE,
    Verdict,
};
pub use model::{
    Backend, ModelError, ModelReply, ModelRequest, ModelResponse, ParamKind, ParamSpec, Role,
    ToolCall, ToolSpec, Turn, Usage,
};
pub use providers::{OpenAiBackend, OpenAiBackendBuilder};
pub use session::{SYSTEM_PROMPT, Session, SessionOptions, WELCOME_MESSAGE, style_context};
pub use style::{ClassifyError, CommandClassifier, PaintingStyle, StyleClassifier};
pub use tools::{FnTool, RegistryError, Tool, ToolError, ToolRegistry};
pub use transcript::{Transcript, TranscriptError};
