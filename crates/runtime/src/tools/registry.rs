//! Name-to-tool registry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::{FnTool, RegistryError, Tool, ToolError};
use crate::model::{ToolCall, ToolSpec};

/// Maps tool names to executables and exposes their specs.
///
/// Built once at startup; read-only afterwards, so one registry can be shared
/// across sessions behind an `Arc`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    specs: Vec<ToolSpec>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails without touching the registry if the name is taken.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(tool))
    }

    /// Register an already shared tool.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let spec = tool.spec().clone();
        if self.index.contains_key(&spec.name) {
            return Err(RegistryError::Duplicate(spec.name));
        }
        debug!(tool = %spec.name, "registered tool");
        self.index.insert(spec.name.clone(), self.tools.len());
        self.specs.push(spec);
        self.tools.push(tool);
        Ok(())
    }

    /// Register an async closure under `spec`.
    pub fn register_fn<F, Fut>(&mut self, spec: ToolSpec, f: F) -> Result<(), RegistryError>
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        self.register(FnTool::new(spec, f))
    }

    /// All specs, in registration order.
    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up `name`, validate `args` against its spec, and execute it.
    ///
    /// Every call executes; results are never cached.
    pub async fn invoke(&self, name: &str, args: Map<String, Value>) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        validate(tool.spec(), &args)?;
        tool.call(args).await
    }

    /// Dispatch a model-emitted request.
    ///
    /// The name is resolved before the argument text is parsed, so an unknown
    /// tool is reported as such even when its arguments are garbage.
    pub async fn dispatch(&self, call: &ToolCall) -> Result<Value, ToolError> {
        if !self.contains(&call.name) {
            return Err(ToolError::NotFound(call.name.clone()));
        }
        let args = call.parse_arguments()?;
        self.invoke(&call.name, args).await
    }
}

fn validate(spec: &ToolSpec, args: &Map<String, Value>) -> Result<(), ToolError> {
    for param in &spec.params {
        match args.get(&param.name) {
            None | Some(Value::Null) if param.required => {
                return Err(ToolError::MalformedArguments(format!(
                    "missing required parameter `{}`",
                    param.name
                )));
            }
            None | Some(Value::Null) => {}
            Some(value) if !param.kind.accepts(value) => {
                return Err(ToolError::MalformedArguments(format!(
                    "parameter `{}` must be {}",
                    param.name,
                    param.kind.as_str()
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}
