//! Curator tools backed by [`ArtsyClient`].

use std::sync::Arc;

use async_trait::async_trait;
use runtime::{ParamKind, RegistryError, Tool, ToolError, ToolRegistry, ToolSpec};
use serde_json::{Map, Value};
use tracing::info;

use crate::client::{ArtsyClient, SearchLimits};

const SEARCH_GENE_DESCRIPTION: &str = "\
A 'gene' is a distinctive characteristic or attribute that defines an art object \
(e.g. 'Pop Art', 'Impressionism', 'Bright Colors'). Returns the gene matching the query with:
- name: the official name of the gene.
- description: a detailed description of the gene.
- image_versions: available image formats, to fill into templated image links.
- _links: related URLs, including further API calls and public pages, e.g.
    - thumbnail: default image thumbnail.
    - image: templated link for the gene's main image.";

const SEARCH_ARTIST_DESCRIPTION: &str = "\
Returns artists matching the query, each with:
- type / og_type: the kind of entry, 'artist'.
- title: the artist's name.
- description: a description of the artist, often empty.
- _links: web links for the artist:
    - self: the artist's details as an API link.
    - permalink: the artist's page on Artsy.
    - thumbnail: an image thumbnail, usually one of their works.";

const FETCH_LINKS_DESCRIPTION: &str = "\
Responses from the other art database tools contain API links. \
Fetches the response behind one of those links.";

/// Look up a gene (art characteristic) by name.
pub struct SearchGene {
    client: Arc<ArtsyClient>,
    spec: ToolSpec,
}

impl SearchGene {
    pub fn new(client: Arc<ArtsyClient>) -> Self {
        Self {
            client,
            spec: ToolSpec::new("search_gene", SEARCH_GENE_DESCRIPTION).required(
                "query",
                ParamKind::String,
                "The gene to search for (e.g., Pop Art, Impressionism, Bright Colors)",
            ),
        }
    }
}

#[async_trait]
impl Tool for SearchGene {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let query = string_arg(&args, "query")?;
        info!(query, "searching for art with characteristics");
        self.client
            .gene(&gene_slug(query))
            .await
            .map_err(ToolError::execution)
    }
}

/// Search artists by name.
pub struct SearchArtist {
    client: Arc<ArtsyClient>,
    spec: ToolSpec,
}

impl SearchArtist {
    pub fn new(client: Arc<ArtsyClient>) -> Self {
        Self {
            client,
            spec: ToolSpec::new("search_artist", SEARCH_ARTIST_DESCRIPTION).required(
                "query",
                ParamKind::String,
                "Name of the artist to search for (e.g., Andy Warhol, Banksy)",
            ),
        }
    }
}

#[async_trait]
impl Tool for SearchArtist {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let query = string_arg(&args, "query")?;
        info!(query, "searching for artists");
        self.client
            .search_all(query, Some("artist"), SearchLimits::default())
            .await
            .map_err(ToolError::execution)
    }
}

/// Follow an API link from an earlier tool result.
pub struct FetchLinks {
    client: Arc<ArtsyClient>,
    spec: ToolSpec,
}

impl FetchLinks {
    pub fn new(client: Arc<ArtsyClient>) -> Self {
        Self {
            client,
            spec: ToolSpec::new("fetch_links", FETCH_LINKS_DESCRIPTION).required(
                "api_link",
                ParamKind::String,
                "The complete API link provided in responses from other API calls",
            ),
        }
    }
}

#[async_trait]
impl Tool for FetchLinks {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let link = string_arg(&args, "api_link")?;
        info!(link, "fetching linked resource");
        self.client
            .fetch_link(link)
            .await
            .map_err(ToolError::execution)
    }
}

/// Register `search_gene`, `search_artist` and `fetch_links`.
pub fn register_curator_tools(
    registry: &mut ToolRegistry,
    client: Arc<ArtsyClient>,
) -> Result<(), RegistryError> {
    registry.register(SearchGene::new(client.clone()))?;
    registry.register(SearchArtist::new(client.clone()))?;
    registry.register(FetchLinks::new(client))?;
    Ok(())
}

/// Gene ids are lowercase with hyphens: "Pop Art" -> "pop-art".
fn gene_slug(query: &str) -> String {
    query.to_lowercase().replace(' ', "-")
}

fn string_arg<'a>(args: &'a Map<String, Value>, name: &str) -> Result<&'a str, ToolError> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::MalformedArguments(format!("missing string argument: {name}")))
}
