use thiserror::Error;

/// Errors from the model gateway.
///
/// Any of these is fatal to the current `respond` call; retries belong to the
/// backend itself.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// A network error occurred during the API call.
    #[error("network: {0}")]
    Network(String),

    /// The provider returned a non-success status.
    #[error("provider api: {0}")]
    Api(String),

    /// The provider response could not be parsed into a reply.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// The transcript is too large to send; nothing reached the provider.
    #[error("prompt too long: about {tokens} tokens, limit {limit}")]
    PromptTooLong { tokens: usize, limit: usize },
}
