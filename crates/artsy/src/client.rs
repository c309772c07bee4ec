//! Authenticated Artsy REST client.

use std::future::Future;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.artsy.net/api";

const TOKEN_HEADER: &str = "X-Xapp-Token";
const PAGE_SIZE: usize = 10;
const PAGE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Limits applied by [`ArtsyClient::search_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    pub max_results: usize,
    pub max_pages: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_results: 10,
            max_pages: 5,
        }
    }
}

/// Client for the Artsy public API.
///
/// Holds one XAPP token for its lifetime; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct ArtsyClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ArtsyClient {
    /// Exchange client credentials for an XAPP token against the public API.
    pub async fn connect(client_id: &str, client_secret: &str) -> Result<Self> {
        Self::connect_to(DEFAULT_BASE_URL, client_id, client_secret).await
    }

    pub async fn connect_to(base_url: &str, client_id: &str, client_secret: &str) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let http = reqwest::Client::new();

        let url = parse_url(
            &format!("{base_url}/tokens/xapp_token"),
            &[("client_id", client_id), ("client_secret", client_secret)],
        )?;
        let response = check_status(http.post(url).send().await?).await?;
        let TokenResponse { token } = response.json().await?;
        debug!(%base_url, "obtained artsy xapp token");

        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// Build a client around a token that was issued elsewhere.
    pub fn with_token(base_url: &str, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One page of free-text search results.
    pub async fn search(&self, query: &str, size: usize, offset: usize) -> Result<Value> {
        let size = size.to_string();
        let offset = offset.to_string();
        let url = parse_url(
            &format!("{}/search", self.base_url),
            &[("q", query), ("size", &size), ("offset", &offset)],
        )?;
        self.get(url).await
    }

    /// Search across pages, keeping only results of `type_filter` when given.
    ///
    /// The returned value keeps the first page's envelope with
    /// `_embedded.results` replaced by everything collected.
    pub async fn search_all(
        &self,
        query: &str,
        type_filter: Option<&str>,
        limits: SearchLimits,
    ) -> Result<Value> {
        paginate(
            |offset| self.search(query, PAGE_SIZE, offset),
            type_filter,
            limits,
            PAGE_DELAY,
        )
        .await
    }

    /// Look up a gene by its slug, e.g. `pop-art`.
    pub async fn gene(&self, gene_id: &str) -> Result<Value> {
        let url = self.endpoint(&["genes", gene_id])?;
        self.get(url).await
    }

    /// Follow a link taken from an earlier API response.
    pub async fn fetch_link(&self, link: &str) -> Result<Value> {
        let url = self.check_link(link)?;
        self.get(url).await
    }

    /// API URL with `segments` appended to the base path, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = parse_url(&self.base_url, &[])?;
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(format!("{}: cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Only links on the client's own API host carry the token.
    fn check_link(&self, link: &str) -> Result<Url> {
        let url = parse_url(link, &[])?;
        let base = parse_url(&self.base_url, &[])?;
        if url.scheme() != base.scheme()
            || url.host_str() != base.host_str()
            || url.port() != base.port()
        {
            return Err(Error::ForeignLink {
                link: link.to_string(),
                allowed: base.host_str().unwrap_or_default().to_string(),
            });
        }
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<Value> {
        debug!(%url, "artsy request");
        let response = self
            .http
            .get(url)
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }
}

fn parse_url(raw: &str, params: &[(&str, &str)]) -> Result<Url> {
    let parsed = if params.is_empty() {
        Url::parse(raw)
    } else {
        Url::parse_with_params(raw, params)
    };
    parsed.map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        body,
    })
}

async fn paginate<F, Fut>(
    mut fetch: F,
    type_filter: Option<&str>,
    limits: SearchLimits,
    delay: Duration,
) -> Result<Value>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Value>>,
{
    let mut collected: Vec<Value> = Vec::new();
    let mut envelope: Option<Value> = None;
    let mut offset = 0;

    loop {
        let page = fetch(offset).await?;

        if let Some(results) = page.pointer("/_embedded/results").and_then(Value::as_array) {
            collected.extend(
                results
                    .iter()
                    .filter(|r| {
                        type_filter.is_none_or(|t| r.get("type").and_then(Value::as_str) == Some(t))
                    })
                    .cloned(),
            );
        }
        let has_next = page.pointer("/_links/next").is_some();
        if envelope.is_none() {
            envelope = Some(page);
        }

        if collected.len() >= limits.max_results || offset / PAGE_SIZE >= limits.max_pages {
            break;
        }
        if !has_next {
            break;
        }
        offset += PAGE_SIZE;
        tokio::time::sleep(delay).await;
    }

    debug!(results = collected.len(), pages = offset / PAGE_SIZE + 1, "search finished");

    let mut envelope = match envelope {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    let embedded = envelope.entry("_embedded").or_insert_with(|| json!({}));
    if !embedded.is_object() {
        *embedded = json!({});
    }
    if let Some(embedded) = embedded.as_object_mut() {
        embedded.insert("results".into(), Value::Array(collected));
    }
    Ok(Value::Object(envelope))
}
