use thiserror::Error;

/// Art database client errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("artsy api returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("refusing to follow {link}: not an {allowed} link")]
    ForeignLink { link: String, allowed: String },
}

pub type Result<T> = std::result::Result<T, Error>;
