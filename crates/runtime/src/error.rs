use thiserror::Error;

use crate::agent::AgentError;
use crate::style::ClassifyError;
use crate::tools::RegistryError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Storage(#[from] storage::Error),
}

impl Error {
    /// Text suitable for showing to the person chatting.
    pub fn user_message(&self) -> String {
        match self {
            Self::Agent(e) => e.user_message().to_string(),
            other => format!("Sorry, something went wrong: {other}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
