//! Append-only conversation transcript.

use thiserror::Error;
use tracing::trace;

use crate::model::{Role, Turn};

/// Violations of the transcript's linkage rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("tool result turn has no tool_call_id")]
    MissingCallId,
    #[error("tool result {0} does not answer any pending tool call")]
    OrphanToolResult(String),
}

/// Ordered log of turns.
///
/// Turns can only be appended. A tool-role turn is accepted only when it
/// answers a tool call that an earlier assistant turn requested and that has
/// not been answered yet.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
    unresolved: Vec<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a transcript from seed turns, checking each one.
    pub fn with_turns(turns: impl IntoIterator<Item = Turn>) -> Result<Self, TranscriptError> {
        let mut transcript = Self::new();
        for turn in turns {
            transcript.push(turn)?;
        }
        Ok(transcript)
    }

    pub fn push(&mut self, turn: Turn) -> Result<(), TranscriptError> {
        match turn.role {
            Role::Tool => {
                let id = turn
                    .tool_call_id
                    .as_deref()
                    .ok_or(TranscriptError::MissingCallId)?;
                let pos = self
                    .unresolved
                    .iter()
                    .position(|pending| pending == id)
                    .ok_or_else(|| TranscriptError::OrphanToolResult(id.to_string()))?;
                self.unresolved.remove(pos);
            }
            Role::Assistant => {
                self.unresolved
                    .extend(turn.tool_calls.iter().map(|call| call.id.clone()));
            }
            Role::System | Role::User => {}
        }
        trace!(
            role = turn.role.as_str(),
            tool_calls = turn.tool_calls.len(),
            position = self.turns.len(),
            "turn appended"
        );
        self.turns.push(turn);
        Ok(())
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Turns appended at or after position `start`.
    pub fn since(&self, start: usize) -> &[Turn] {
        self.turns.get(start..).unwrap_or_default()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Ids of requested tool calls that have no result yet.
    pub fn unresolved_calls(&self) -> &[String] {
        &self.unresolved
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolCall;
    use serde_json::json;

    #[test]
    fn tool_results_resolve_pending_calls() {
        let a = ToolCall::new("a", "search_gene", "{}");
        let b = ToolCall::new("b", "search_artist", "{}");
        let mut transcript = Transcript::new();
        transcript.push(Turn::user("hi")).unwrap();
        transcript
            .push(Turn::assistant_tool_calls(None, vec![a.clone(), b.clone()]))
            .unwrap();
        assert_eq!(transcript.unresolved_calls(), ["a", "b"]);

        transcript.push(Turn::tool_result(&b, &Ok(json!(1)))).unwrap();
        transcript.push(Turn::tool_result(&a, &Ok(json!(2)))).unwrap();
        assert!(transcript.unresolved_calls().is_empty());
        assert_eq!(transcript.len(), 4);
    }

    #[test]
    fn orphan_tool_result_is_rejected() {
        let call = ToolCall::new("x", "search_gene", "{}");
        let mut transcript = Transcript::new();
        let err = transcript
            .push(Turn::tool_result(&call, &Ok(json!(null))))
            .unwrap_err();
        assert_eq!(err, TranscriptError::OrphanToolResult("x".into()));
        assert!(transcript.is_empty());
    }

    #[test]
    fn a_call_is_answered_only_once() {
        let call = ToolCall::new("x", "search_gene", "{}");
        let mut transcript =
            Transcript::with_turns([Turn::assistant_tool_calls(None, vec![call.clone()])]).unwrap();
        transcript
            .push(Turn::tool_result(&call, &Ok(json!(1))))
            .unwrap();
        assert!(transcript.push(Turn::tool_result(&call, &Ok(json!(2)))).is_err());
    }

    #[test]
    fn tool_turn_without_id_is_rejected() {
        let mut turn = Turn::user("pretend");
        turn.role = Role::Tool;
        let mut transcript = Transcript::new();
        assert_eq!(transcript.push(turn), Err(TranscriptError::MissingCallId));
    }

    #[test]
    fn since_returns_the_tail() {
        let transcript =
            Transcript::with_turns([Turn::system("s"), Turn::assistant("w"), Turn::user("u")])
                .unwrap();
        assert_eq!(transcript.since(1).len(), 2);
        assert!(transcript.since(3).is_empty());
        assert!(transcript.since(10).is_empty());
    }
}
