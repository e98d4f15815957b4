//! Web search fetcher.
//!
//! Issues two canned queries per searchable affiliate network domain through a
//! pluggable `WebSearchBackend` and turns each hit into an unverified offer.
//! Without a backend the source reports `not_configured`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{OfferSource, SourceQuery};
use crate::error::SourceError;
use crate::networks::{self, KnownNetwork};
use crate::offer::{CommissionRate, OfferRecord, Provenance};

/// One organic search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

#[async_trait]
pub trait WebSearchBackend: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SourceError>;
}

const QUERY_TEMPLATES: &[&str] = &[
    "{term} affiliate program site:{domain}",
    "{term} commission rate site:{domain}",
];

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static RE_COMMISSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?\s*(?:-|–|to)\s*\d+(?:\.\d+)?\s*%|\d+(?:\.\d+)?\s*%|\$\s*\d+(?:,\d{3})*(?:\.\d+)?)")
        .expect("commission regex")
});
static RE_TITLE_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+(?:[-|–—:]|\bon\b)\s+").expect("title split regex"));

/// Strip markup and entities from a snippet.
pub fn clean_snippet(raw: &str) -> String {
    let no_tags = RE_TAGS.replace_all(raw, " ");
    let decoded = html_escape::decode_html_entities(&no_tags);
    RE_WS.replace_all(decoded.trim(), " ").into_owned()
}

/// First segment of a result title: "REI Affiliate Program | ShareASale" → "REI Affiliate Program".
pub fn program_name_from_title(title: &str) -> String {
    let cleaned = clean_snippet(title);
    RE_TITLE_SPLIT
        .split(&cleaned)
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

pub fn commission_from_text(text: &str) -> Option<CommissionRate> {
    RE_COMMISSION
        .find(text)
        .map(|m| CommissionRate::Text(m.as_str().trim().to_string()))
}

/// Map a search hit to an offer. `network` is the network the query targeted, if any.
pub fn offer_from_hit(
    hit: &SearchHit,
    provenance: Provenance,
    network: Option<&KnownNetwork>,
) -> Option<OfferRecord> {
    let name = program_name_from_title(&hit.title);
    if name.is_empty() {
        return None;
    }
    let snippet = clean_snippet(&hit.snippet);

    let mut o = OfferRecord::new(name, provenance);
    o.commission_rate = commission_from_text(&snippet);
    o.network = network
        .or_else(|| networks::match_link(&hit.url))
        .or_else(|| networks::match_name(&snippet))
        .map(|k| k.display.to_string());
    if !hit.url.trim().is_empty() {
        o.program_url = Some(hit.url.trim().to_string());
    }
    if !snippet.is_empty() {
        o.description = Some(snippet);
    }
    Some(o)
}

pub struct WebSearchSource {
    backend: Option<Arc<dyn WebSearchBackend>>,
    timeout: Duration,
}

impl WebSearchSource {
    pub fn new(backend: Option<Arc<dyn WebSearchBackend>>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    fn queries(term: &str) -> Vec<(String, &'static KnownNetwork)> {
        networks::searchable()
            .flat_map(|kn| {
                kn.domains.first().into_iter().flat_map(move |domain| {
                    QUERY_TEMPLATES.iter().map(move |tpl| {
                        let q = tpl.replace("{term}", term).replace("{domain}", domain);
                        (q, kn)
                    })
                })
            })
            .collect()
    }
}

#[async_trait]
impl OfferSource for WebSearchSource {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn provenance(&self) -> Provenance {
        Provenance::WebSearch
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<OfferRecord>, SourceError> {
        let backend = self.backend.as_ref().ok_or(SourceError::NotConfigured)?;
        let queries = Self::queries(query.term.trim());
        let per_query = (query.limit / queries.len().max(1)).max(1);

        let results = join_all(queries.iter().map(|(q, kn)| {
            let backend = Arc::clone(backend);
            async move { (backend.search(q, per_query).await, *kn) }
        }))
        .await;

        let mut offers = Vec::new();
        let mut first_err = None;
        let mut any_ok = false;
        for (res, kn) in results {
            match res {
                Ok(hits) => {
                    any_ok = true;
                    offers.extend(
                        hits.iter()
                            .filter_map(|h| offer_from_hit(h, Provenance::WebSearch, Some(kn))),
                    );
                }
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }

        match (any_ok, first_err) {
            (false, Some(e)) => Err(e),
            _ => {
                offers.truncate(query.limit);
                Ok(offers)
            }
        }
    }
}
