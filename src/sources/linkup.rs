//! LinkUp search API client.
//!
//! `POST {base_url}/search` with `{q, depth: "standard", outputType: "searchResults"}`,
//! answer `{results: [{name, url, content}]}`. Serves both as the affiliate offer
//! API and, when configured, as the web-search backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::web_search::{offer_from_hit, SearchHit, WebSearchBackend};
use super::{OfferSearchApi, SourceQuery};
use crate::error::SourceError;
use crate::offer::{OfferRecord, Provenance};

#[derive(Clone)]
pub struct LinkupClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchReq<'a> {
    q: &'a str,
    depth: &'a str,
    output_type: &'a str,
}

#[derive(Deserialize)]
struct SearchResp {
    #[serde(default)]
    results: Vec<ResultItem>,
}

#[derive(Deserialize)]
struct ResultItem {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

impl LinkupClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .user_agent("affiliate-research/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(40))
            .build()?;
        Ok(Self::with_http(http, base_url, api_key))
    }

    pub fn with_http(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    async fn raw_search(&self, query: &str) -> Result<Vec<SearchHit>, SourceError> {
        let resp = self
            .http
            .post(format!("{}/search", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&SearchReq {
                q: query,
                depth: "standard",
                output_type: "searchResults",
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(SourceError::Status {
                status: resp.status().as_u16(),
            });
        }
        let bytes = resp.bytes().await?;
        parse_results(&bytes)
    }
}

fn parse_results(body: &[u8]) -> Result<Vec<SearchHit>, SourceError> {
    let parsed: SearchResp =
        serde_json::from_slice(body).map_err(|e| SourceError::Malformed(e.to_string()))?;
    Ok(parsed
        .results
        .into_iter()
        .filter(|r| !r.name.trim().is_empty())
        .map(|r| SearchHit {
            title: r.name,
            url: r.url,
            snippet: r.content,
        })
        .collect())
}

pub fn offer_query(query: &SourceQuery) -> String {
    match query.category {
        Some(cat) => format!(
            "{} affiliate program commission rate ({})",
            query.term.trim(),
            cat.label()
        ),
        None => format!("{} affiliate program commission rate", query.term.trim()),
    }
}

#[async_trait]
impl OfferSearchApi for LinkupClient {
    async fn search_offers(&self, query: &SourceQuery) -> Result<Vec<OfferRecord>, SourceError> {
        let hits = self.raw_search(&offer_query(query)).await?;
        Ok(hits
            .iter()
            .filter_map(|h| offer_from_hit(h, Provenance::AffiliateApi, None))
            .map(|mut o| {
                o.category = query.category;
                o
            })
            .take(query.limit)
            .collect())
    }
}

#[async_trait]
impl WebSearchBackend for LinkupClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SourceError> {
        let mut hits = self.raw_search(query).await?;
        hits.truncate(limit);
        Ok(hits)
    }
}
