//! Scripted gateway and tools shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use runtime::{
    Backend, ModelError, ModelReply, ModelRequest, ModelResponse, ParamKind, ToolCall,
    ToolError, ToolRegistry, ToolSpec, Turn,
};
use serde_json::{Value, json};

/// Replays canned replies and records every transcript it was shown.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<ModelReply, ModelError>>>,
    repeat: Option<ModelReply>,
    seen: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedBackend {
    pub fn new(replies: impl IntoIterator<Item = ModelReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            ..Self::default()
        }
    }

    pub fn with_results(results: impl IntoIterator<Item = Result<ModelReply, ModelError>>) -> Self {
        Self {
            replies: Mutex::new(results.into_iter().collect()),
            ..Self::default()
        }
    }

    /// A backend that answers every call with `reply`.
    pub fn always(reply: ModelReply) -> Self {
        Self {
            repeat: Some(reply),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn seen(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().unwrap().clone()
    }
}

impl Backend for ScriptedBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        self.seen.lock().unwrap().push(request.turns.to_vec());
        if let Some(reply) = &self.repeat {
            return Ok(reply.clone().into());
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Api("script exhausted".into())))
            .map(ModelResponse::from)
    }
}

pub fn call(id: &str, name: &str, arguments: &str) -> ToolCall {
    ToolCall::new(id, name, arguments)
}

pub fn query_spec(name: &str) -> ToolSpec {
    ToolSpec::new(name, format!("{name} test tool")).required(
        "query",
        ParamKind::String,
        "Search text",
    )
}

/// Registry with `slow_a`, `slow_b`, `slow_c` (decreasing-then-mixed latency),
/// `echo`, and `broken`. The counter tracks total executions.
pub fn test_registry(executions: Arc<AtomicUsize>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    for (name, delay_ms) in [("slow_a", 40u64), ("slow_b", 1), ("slow_c", 15)] {
        let executions = executions.clone();
        registry
            .register_fn(query_spec(name), move |args| {
                let executions = executions.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    executions.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({ "tool": name, "query": args["query"] }))
                }
            })
            .unwrap();
    }

    let echo_count = executions.clone();
    registry
        .register_fn(query_spec("echo"), move |args| {
            let executions = echo_count.clone();
            async move {
                executions.fetch_add(1, Ordering::SeqCst);
                Ok(args.get("query").cloned().unwrap_or(Value::Null))
            }
        })
        .unwrap();

    let broken_count = executions;
    registry
        .register_fn(query_spec("broken"), move |_| {
            let executions = broken_count.clone();
            async move {
                executions.fetch_add(1, Ordering::SeqCst);
                Err(ToolError::execution("art database unavailable"))
            }
        })
        .unwrap();

    registry
}
