//! Artsy art database client and the curator tools built on it.
//!
//! [`ArtsyClient`] handles XAPP token authentication, search pagination and
//! link following. The [`tools`] module wraps it as agent tools:
//! `search_gene`, `search_artist` and `fetch_links`.

mod client;
mod error;
pub mod tools;

pub use client::{ArtsyClient, DEFAULT_BASE_URL, SearchLimits};
pub use error::{Error, Result};
pub use tools::{FetchLinks, SearchArtist, SearchGene, register_curator_tools};
