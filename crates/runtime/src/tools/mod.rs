//! Tool definitions and the registry that dispatches them.

pub mod errors;
mod registry;
mod tool;

pub use errors::{RegistryError, ToolError};
pub use registry::ToolRegistry;
pub use tool::{FnTool, Tool};
