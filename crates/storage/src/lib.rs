//! SQLite-backed audit log for Musezen chat sessions.
//!
//! Every session start/end, every user and assistant message, and every tool
//! request and result is appended here as an [`Event`]. The log is write-only
//! from the chat's point of view: it answers "what did the curator do and
//! why" after the fact, and never restores a conversation.
//!
//! # Example
//!
//! ```no_run
//! use storage::{Event, EventKind, EventStore, Role, SessionId};
//!
//! let store = EventStore::open("events.db")?;
//! let session_id = SessionId::new();
//! store.append(&Event::new(session_id, EventKind::SessionStart))?;
//! store.append(&Event::message(session_id, Role::User, "Show me some Pop Art"))?;
//!
//! for event in store.load_session(session_id)? {
//!     println!("{}: {:?}", event.timestamp, event.kind);
//! }
//! # Ok::<(), storage::Error>(())
//! ```

mod error;
mod event;
mod store;

pub use error::{Error, Result};
pub use event::{Event, EventKind, Role, SessionId};
pub use store::{EventStore, SessionSummary};
