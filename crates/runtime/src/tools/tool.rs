//! Tool trait.

use crate::model::ToolSpec;
use crate::tools::ToolError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;

/// An externally executed capability the model may request.
///
/// This is the boundary between the agent loop and side effects: a tool
/// reports every failure as a [`ToolError`] instead of unwinding.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Static description exposed to the model.
    fn spec(&self) -> &ToolSpec;

    /// Execute with an already-validated argument object.
    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError>;
}

/// A tool backed by an async closure.
pub struct FnTool<F> {
    spec: ToolSpec,
    f: F,
}

impl<F> FnTool<F> {
    pub fn new(spec: ToolSpec, f: F) -> Self {
        Self { spec, f }
    }
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        (self.f)(args).await
    }
}
