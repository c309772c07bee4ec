//! Model gateway adapters.
//!
//! Each provider implements [`Backend`](crate::Backend) for its own wire format.

mod openai;

pub use openai::{OpenAiBackend, OpenAiBackendBuilder};
