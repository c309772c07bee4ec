//! The tool-calling agent loop.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::model::{Backend, ModelError, ModelReply, ModelRequest, ToolCall, Turn};
use crate::tools::{ToolError, ToolRegistry};
use crate::transcript::{Transcript, TranscriptError};

/// Default ceiling on model round-trips per user turn.
pub const DEFAULT_MAX_ROUND_TRIPS: usize = 8;

/// Assistant text recorded when the round-trip ceiling is hit.
pub const ROUND_TRIP_LIMIT_MESSAGE: &str = "I'm sorry, I couldn't complete this request.";

/// Errors that end a `respond` call.
///
/// The transcript stays consistent after any of these, so the next user turn
/// can proceed without a reset.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgentError {
    #[error("model gateway failed: {0}")]
    Gateway(#[from] ModelError),

    #[error("no final answer after {limit} round-trips")]
    RoundTripLimit { limit: usize },

    #[error("request cancelled")]
    Cancelled,

    #[error(transparent)]
    Transcript(#[from] TranscriptError),
}

impl AgentError {
    /// Text suitable for showing to the person chatting.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Gateway(ModelError::PromptTooLong { .. }) => {
                "This conversation is too long for me to read. Please /clear it and ask again."
            }
            Self::Gateway(_) => "Sorry, I couldn't reach the language model. Please try again.",
            Self::RoundTripLimit { .. } => ROUND_TRIP_LIMIT_MESSAGE,
            Self::Cancelled => "The request was cancelled.",
            Self::Transcript(_) => "Sorry, something went wrong while recording the conversation.",
        }
    }
}

/// Per-agent tuning.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum gateway calls per `respond`; values below 1 are treated as 1.
    pub max_round_trips: usize,
    /// Upper bound on a single tool invocation.
    pub tool_timeout: Option<Duration>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_round_trips: DEFAULT_MAX_ROUND_TRIPS,
            tool_timeout: None,
        }
    }
}

/// Per-call context: cancellation and an optional ceiling override.
#[derive(Debug, Clone, Default)]
pub struct RespondContext {
    pub cancel: CancellationToken,
    pub max_round_trips: Option<usize>,
}

impl RespondContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            max_round_trips: None,
        }
    }

    pub fn with_max_round_trips(mut self, limit: usize) -> Self {
        self.max_round_trips = Some(limit);
        self
    }
}

/// One conversation with the model.
///
/// The agent exclusively owns its transcript; the backend and registry are
/// shared and never mutated.
pub struct Agent<B> {
    backend: Arc<B>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
    transcript: Transcript,
}

impl<B: Backend> Agent<B> {
    pub fn new(backend: Arc<B>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            backend,
            tools,
            config: AgentConfig::default(),
            transcript: Transcript::new(),
        }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Start from existing turns (system prompt, welcome message, ...).
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = transcript;
        self
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Drive one user turn to a final answer.
    pub async fn respond(&mut self, input: &str) -> Result<String, AgentError> {
        self.respond_with(input, &RespondContext::default()).await
    }

    /// Like [`Agent::respond`], with cancellation and a per-call ceiling.
    pub async fn respond_with(
        &mut self,
        input: &str,
        ctx: &RespondContext,
    ) -> Result<String, AgentError> {
        self.transcript.push(Turn::user(input))?;

        let limit = ctx
            .max_round_trips
            .unwrap_or(self.config.max_round_trips)
            .max(1);

        for round_trip in 1..=limit {
            debug!(round_trip, turns = self.transcript.len(), "consulting model");

            let request = ModelRequest {
                turns: self.transcript.turns(),
                tools: self.tools.specs(),
            };
            let response = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => None,
                response = self.backend.call(request) => Some(response),
            };
            let Some(response) = response else {
                debug!(round_trip, "cancelled while waiting for the model");
                return Err(AgentError::Cancelled);
            };
            let response = response.inspect_err(|e| {
                error!(round_trip, error = %e, "model call failed");
            })?;
            debug!(
                round_trip,
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                "model replied"
            );

            match response.reply.normalize() {
                ModelReply::Text(text) => {
                    self.transcript.push(Turn::assistant(text.clone()))?;
                    return Ok(text);
                }
                ModelReply::ToolCalls { content, calls } => {
                    self.transcript
                        .push(Turn::assistant_tool_calls(content, calls.clone()))?;
                    self.run_batch(&calls, ctx).await?;
                }
            }
        }

        warn!(limit, "round-trip limit reached without a final answer");
        self.transcript
            .push(Turn::assistant(ROUND_TRIP_LIMIT_MESSAGE))?;
        Err(AgentError::RoundTripLimit { limit })
    }

    /// Execute one batch sequentially, recording a result per request.
    async fn run_batch(
        &mut self,
        calls: &[ToolCall],
        ctx: &RespondContext,
    ) -> Result<(), AgentError> {
        for (index, call) in calls.iter().enumerate() {
            let outcome = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => None,
                outcome = self.execute(call) => Some(outcome),
            };

            let Some(outcome) = outcome else {
                for pending in &calls[index..] {
                    self.transcript
                        .push(Turn::tool_result(pending, &Err(ToolError::Cancelled)))?;
                }
                return Err(AgentError::Cancelled);
            };

            if let Err(e) = &outcome {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "tool call failed");
            } else {
                debug!(tool = %call.name, call_id = %call.id, "tool call succeeded");
            }
            self.transcript.push(Turn::tool_result(call, &outcome))?;
        }
        Ok(())
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let dispatch = self.tools.dispatch(call);
        match self.config.tool_timeout {
            Some(limit) => tokio::time::timeout(limit, dispatch)
                .await
                .map_err(|_| ToolError::Timeout(duration_millis(limit)))?,
            None => dispatch.await,
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
