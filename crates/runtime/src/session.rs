//! Chat session management.

use std::sync::Arc;

use storage::{Event, EventKind, EventStore, SessionId};
use tracing::{info, warn};

use crate::agent::{Agent, AgentConfig, RespondContext};
use crate::model::{Backend, Role, Turn};
use crate::style::PaintingStyle;
use crate::tools::ToolRegistry;
use crate::transcript::Transcript;
use crate::Result;

/// Welcome text shown at the top of every fresh conversation.
pub const WELCOME_MESSAGE: &str =
    "Hi! I'm Musezen, your personal art curator. What are we looking for today?";

/// Default system prompt for the curator persona.
pub const SYSTEM_PROMPT: &str = "You are an art curator. You are helping a user discover more \
about artworks, artists, or the venues. Write in well-formatted markdown and provide images \
where necessary.";

/// Static settings used every time the session (re)builds its agent.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub system_prompt: Option<String>,
    pub welcome_message: String,
    pub agent: AgentConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            system_prompt: Some(SYSTEM_PROMPT.to_string()),
            welcome_message: WELCOME_MESSAGE.to_string(),
            agent: AgentConfig::default(),
        }
    }
}

/// Build the user prompt that carries the uploaded painting's style.
pub fn style_context(style: PaintingStyle, prompt: &str) -> String {
    format!(
        "Context: the user uploaded image with the style of {style}\nAnd here is the user prompt:\n{prompt}"
    )
}

/// A conversation session.
///
/// Wraps one [`Agent`] with the state a chat front-end keeps around it: the
/// single-use painting style context, reset, and the audit log.
pub struct Session<B> {
    id: SessionId,
    store: EventStore,
    backend: Arc<B>,
    tools: Arc<ToolRegistry>,
    options: SessionOptions,
    agent: Agent<B>,
    pending_style: Option<PaintingStyle>,
}

impl<B: Backend> Session<B> {
    /// Create a new session and log its start.
    pub fn new(
        store: EventStore,
        backend: Arc<B>,
        tools: Arc<ToolRegistry>,
        options: SessionOptions,
    ) -> Result<Self> {
        let agent = fresh_agent(&backend, &tools, &options)?;
        let session = Self {
            id: SessionId::new(),
            store,
            backend,
            tools,
            options,
            agent,
            pending_style: None,
        };
        session.log_start()?;
        Ok(session)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn agent(&self) -> &Agent<B> {
        &self.agent
    }

    pub fn welcome_message(&self) -> &str {
        &self.options.welcome_message
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Arm the style context for the next user turn.
    ///
    /// Attaching again (a new upload) re-arms it.
    pub fn attach_style(&mut self, style: PaintingStyle) {
        info!(session = %self.id, %style, "painting style attached");
        self.pending_style = Some(style);
    }

    pub fn pending_style(&self) -> Option<PaintingStyle> {
        self.pending_style
    }

    /// Send a user message and get the curator's answer.
    pub async fn chat(&mut self, input: &str) -> Result<String> {
        self.chat_with(input, &RespondContext::default()).await
    }

    /// Like [`Session::chat`], with cancellation and a per-call ceiling.
    pub async fn chat_with(&mut self, input: &str, ctx: &RespondContext) -> Result<String> {
        let prompt = match self.pending_style.take() {
            Some(style) => style_context(style, input),
            None => input.to_string(),
        };

        let start = self.agent.transcript().len();
        let result = self.agent.respond_with(&prompt, ctx).await;
        let logged = self.log_turns(start);

        match result {
            Ok(reply) => {
                logged?;
                Ok(reply)
            }
            Err(e) => {
                if let Err(log_err) = logged {
                    warn!(session = %self.id, error = %log_err, "failed to log turns");
                }
                Err(e.into())
            }
        }
    }

    /// Discard the conversation and start over with the welcome turn.
    pub fn reset(&mut self) -> Result<()> {
        self.store
            .append(&Event::new(self.id, EventKind::SessionEnd))?;
        self.agent = fresh_agent(&self.backend, &self.tools, &self.options)?;
        self.pending_style = None;
        self.id = SessionId::new();
        self.log_start()?;
        info!(session = %self.id, "session reset");
        Ok(())
    }

    /// End the session.
    pub fn end(self) -> Result<()> {
        self.store
            .append(&Event::new(self.id, EventKind::SessionEnd))?;
        info!(session = %self.id, "session ended");
        Ok(())
    }

    fn log_start(&self) -> Result<()> {
        self.store
            .append(&Event::new(self.id, EventKind::SessionStart))?;
        self.log_turns(0)?;
        info!(session = %self.id, "session started");
        Ok(())
    }

    fn log_turns(&self, start: usize) -> Result<()> {
        for turn in self.agent.transcript().since(start) {
            for kind in events_for(turn) {
                self.store.append(&Event::new(self.id, kind))?;
            }
        }
        Ok(())
    }
}

fn fresh_agent<B: Backend>(
    backend: &Arc<B>,
    tools: &Arc<ToolRegistry>,
    options: &SessionOptions,
) -> Result<Agent<B>> {
    let seed = options
        .system_prompt
        .iter()
        .map(Turn::system)
        .chain(std::iter::once(Turn::assistant(
            options.welcome_message.clone(),
        )));
    let transcript = Transcript::with_turns(seed).map_err(crate::AgentError::from)?;

    Ok(Agent::new(backend.clone(), tools.clone())
        .with_config(options.agent.clone())
        .with_transcript(transcript))
}

fn events_for(turn: &Turn) -> Vec<EventKind> {
    let mut events = Vec::new();
    match turn.role {
        Role::Tool => events.push(EventKind::ToolResult {
            call_id: turn.tool_call_id.clone().unwrap_or_default(),
            name: turn.tool_name.clone().unwrap_or_default(),
            output: turn.content_str().to_string(),
            is_error: turn.is_error,
        }),
        role => {
            if let Some(content) = turn.content.as_deref().filter(|c| !c.is_empty()) {
                events.push(EventKind::Message {
                    role: storage_role(role),
                    content: content.to_string(),
                });
            }
            events.extend(turn.tool_calls.iter().map(|call| EventKind::ToolCall {
                call_id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            }));
        }
    }
    events
}

fn storage_role(role: Role) -> storage::Role {
    match role {
        Role::System => storage::Role::System,
        Role::User => storage::Role::User,
        Role::Assistant => storage::Role::Assistant,
        Role::Tool => storage::Role::Tool,
    }
}
