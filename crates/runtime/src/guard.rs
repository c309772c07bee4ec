//! Prompt-size and reply-safety checks around any [`Backend`].
//!
//! [`GuardedBackend`] refuses transcripts that would not fit the model's
//! context before any network traffic, and optionally asks a [`Moderator`]
//! to vet every final answer. An unsafe answer is swapped for
//! [`UNSAFE_REPLY_MESSAGE`]; tool requests pass through untouched.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::model::{Backend, ModelError, ModelReply, ModelRequest, ModelResponse, Role, Turn};

/// Prompt budget used when none is configured.
pub const DEFAULT_MAX_PROMPT_TOKENS: usize = 3072;

/// Assistant text shown in place of a reply the moderator rejected.
pub const UNSAFE_REPLY_MESSAGE: &str = "I'm sorry, I cannot help with that";

/// Rough token count: one token per four bytes, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Estimated prompt size of a transcript, tool call payloads included.
pub fn estimate_prompt_tokens(turns: &[Turn]) -> usize {
    turns
        .iter()
        .map(|turn| {
            estimate_tokens(turn.content_str())
                + turn
                    .tool_calls
                    .iter()
                    .map(|call| estimate_tokens(&call.name) + estimate_tokens(&call.arguments))
                    .sum::<usize>()
        })
        .sum()
}

/// Outcome of a safety check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Safe,
    /// `reason` is whatever the moderator reported, e.g. hazard categories.
    Unsafe { reason: String },
}

/// Judges whether an assistant reply to `prompt` may be shown.
#[async_trait]
pub trait Moderator: Send + Sync {
    async fn check(&self, prompt: &str, reply: &str) -> Result<Verdict, ModelError>;
}

/// Moderation through a classifier model served like any chat model.
///
/// The exchange is sent as a user/assistant pair; a response mentioning
/// "unsafe" rejects the reply, any other text accepts it.
pub struct BackendModerator<B> {
    backend: B,
}

impl<B: Backend> BackendModerator<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: Backend> Moderator for BackendModerator<B> {
    async fn check(&self, prompt: &str, reply: &str) -> Result<Verdict, ModelError> {
        let turns = [Turn::user(prompt), Turn::assistant(reply)];
        let response = self
            .backend
            .call(ModelRequest {
                turns: &turns,
                tools: &[],
            })
            .await?;
        let text = match response.reply {
            ModelReply::Text(text) => text,
            ModelReply::ToolCalls { content, .. } => content.unwrap_or_default(),
        };
        Ok(parse_verdict(&text))
    }
}

/// "safe" or "unsafe\nS1,S10" style moderator output.
fn parse_verdict(output: &str) -> Verdict {
    let output = output.trim();
    if output.to_ascii_lowercase().contains("unsafe") {
        let reason = output.lines().skip(1).collect::<Vec<_>>().join(" ");
        Verdict::Unsafe {
            reason: reason.trim().to_string(),
        }
    } else {
        Verdict::Safe
    }
}

/// A backend wrapped with a prompt budget and an optional moderator.
pub struct GuardedBackend<B> {
    inner: B,
    max_prompt_tokens: Option<usize>,
    moderator: Option<Arc<dyn Moderator>>,
}

impl<B: Backend> GuardedBackend<B> {
    /// No limits until configured.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            max_prompt_tokens: None,
            moderator: None,
        }
    }

    /// Refuse prompts estimated at `limit` tokens or more.
    pub fn max_prompt_tokens(mut self, limit: usize) -> Self {
        self.max_prompt_tokens = Some(limit);
        self
    }

    pub fn moderator(mut self, moderator: Arc<dyn Moderator>) -> Self {
        self.moderator = Some(moderator);
        self
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn check_prompt(&self, turns: &[Turn]) -> Result<(), ModelError> {
        let Some(limit) = self.max_prompt_tokens else {
            return Ok(());
        };
        let tokens = estimate_prompt_tokens(turns);
        if tokens >= limit {
            warn!(tokens, limit, "prompt over budget, not sent");
            return Err(ModelError::PromptTooLong { tokens, limit });
        }
        debug!(tokens, limit, "prompt within budget");
        Ok(())
    }
}

impl<B: Backend> Backend for GuardedBackend<B> {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        self.check_prompt(request.turns)?;
        let mut response = self.inner.call(request).await?;

        let verdict = match (&self.moderator, &response.reply) {
            (Some(moderator), ModelReply::Text(reply)) => {
                Some(moderator.check(last_user_text(request.turns), reply).await?)
            }
            _ => None,
        };
        if let Some(Verdict::Unsafe { reason }) = verdict {
            warn!(%reason, "reply rejected by moderator");
            response.reply = ModelReply::text(UNSAFE_REPLY_MESSAGE);
        }
        Ok(response)
    }
}

impl<B: fmt::Display> fmt::Display for GuardedBackend<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)?;
        if self.moderator.is_some() {
            write!(f, " [moderated]")?;
        }
        Ok(())
    }
}

fn last_user_text(turns: &[Turn]) -> &str {
    turns
        .iter()
        .rev()
        .find(|turn| turn.role == Role::User)
        .map(Turn::content_str)
        .unwrap_or_default()
}
