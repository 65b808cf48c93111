//! Display-title enrichment for wikidata entities.
//!
//! Wikidata pages are titled by entity id (`Q42`); the human label lives in
//! the page's display title, an HTML fragment such as
//! `<span class="wb-itemlink-label">Douglas Adams</span> <span class="wb-itemlink-id">(Q42)</span>`.
//!
//! ## API Reference
//!
//! Endpoint: https://www.wikidata.org/w/api.php?action=parse&prop=displaytitle&format=json&page={title}

use super::notification::is_wikidata;
use super::publisher::PublishError;
use async_trait::async_trait;
use scraper::Html;
use serde::Deserialize;
use std::time::Duration;

pub const WIKIDATA_API_URL: &str = "https://www.wikidata.org/w/api.php";

#[derive(Debug, Deserialize)]
struct ParseResponse {
    parse: ParsedPage,
}

#[derive(Debug, Deserialize)]
struct ParsedPage {
    #[serde(default)]
    displaytitle: String,
}

#[async_trait]
pub trait TitleResolver: Send + Sync {
    /// Display title for the raw page title `raw`.
    async fn display_title(&self, raw: &str) -> Result<String, PublishError>;
}

/// First non-empty text node of the fragment that does not repeat `raw`.
pub fn extract_display_title(fragment: &str, raw: &str) -> Option<String> {
    let html = Html::parse_fragment(fragment);
    let found = html
        .root_element()
        .text()
        .map(str::trim)
        .find(|text| !text.is_empty() && !text.contains(raw))
        .map(str::to_string);
    found
}

pub struct WikidataTitles {
    client: reqwest::Client,
    api_url: String,
}

impl WikidataTitles {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_api_url(client, WIKIDATA_API_URL)
    }

    pub fn with_api_url(client: reqwest::Client, api_url: &str) -> Self {
        Self {
            client,
            api_url: api_url.to_string(),
        }
    }
}

#[async_trait]
impl TitleResolver for WikidataTitles {
    async fn display_title(&self, raw: &str) -> Result<String, PublishError> {
        let url = format!(
            "{}?action=parse&prop=displaytitle&format=json&page={}",
            self.api_url,
            urlencoding::encode(raw)
        );

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PublishError::Transport(format!(
                "display title lookup returned HTTP {}",
                response.status()
            )));
        }

        let parsed: ParseResponse = response
            .json()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        Ok(extract_display_title(&parsed.parse.displaytitle, raw).unwrap_or_else(|| raw.to_string()))
    }
}

/// Title to show for an article on `domain`. Only wikidata titles are
/// enriched; lookup failures fall back to the raw title.
pub async fn resolve_title(resolver: &dyn TitleResolver, domain: &str, raw: &str) -> String {
    if !is_wikidata(domain) {
        return raw.to_string();
    }

    match resolver.display_title(raw).await {
        Ok(title) => title,
        Err(e) => {
            log::warn!("⚠️  Failed to get wikidata title for {}: {}", raw, e);
            raw.to_string()
        }
    }
}
