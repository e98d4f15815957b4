//! Company discovery through the LLM.
//!
//! One completion asking for real companies with affiliate programs for the
//! topic. The answer is parsed as a JSON array (fenced or wrapped in prose is
//! fine). Nothing here checks that a company or URL exists, so every record
//! stays `unverified`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{OfferSource, SourceQuery};
use crate::error::{LlmError, SourceError};
use crate::llm::{extract_json_array, CompletionRequest, DynLlm};
use crate::offer::{CommissionRate, OfferRecord, Provenance, Verification};

const SYSTEM: &str = "You are an affiliate marketing researcher. \
Only name companies you are confident run a real, public affiliate program. \
Reply with JSON only.";

#[derive(Debug, Deserialize)]
struct DiscoveredCompany {
    #[serde(alias = "company_name", alias = "program_name")]
    name: String,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "commission")]
    commission_rate: Option<CommissionRate>,
    #[serde(default, alias = "affiliate_network")]
    network: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default, alias = "affiliate_url", alias = "signup_url")]
    program_url: Option<String>,
    #[serde(default)]
    cookie_duration: Option<Value>,
    #[serde(default)]
    target_audience: Option<Value>,
    #[serde(default)]
    content_opportunities: Option<Value>,
}

/// Accept `["a","b"]` or `"a, b"`.
fn string_list(v: Option<Value>) -> Vec<String> {
    match v {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|i| match i {
                Value::String(s) => Some(s),
                _ => None,
            })
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn scalar_text(v: Option<Value>) -> Option<String> {
    match v {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(format!("{n} days")),
        _ => None,
    }
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl From<DiscoveredCompany> for OfferRecord {
    fn from(c: DiscoveredCompany) -> Self {
        let mut o = OfferRecord::new(c.name.trim(), Provenance::LlmDiscovered);
        o.company = non_blank(c.company);
        o.description = non_blank(c.description);
        o.commission_rate = c.commission_rate.filter(CommissionRate::is_populated);
        o.network = non_blank(c.network);
        o.website = non_blank(c.website);
        o.program_url = non_blank(c.program_url);
        o.cookie_duration = scalar_text(c.cookie_duration);
        o.target_audience = string_list(c.target_audience);
        o.content_opportunities = string_list(c.content_opportunities);
        o.verification = Verification::Unverified;
        o
    }
}

/// Parse a completion into offers; items that do not fit the shape are skipped.
pub fn parse_companies(text: &str) -> Result<Vec<OfferRecord>, SourceError> {
    let items = extract_json_array(text)
        .ok_or_else(|| SourceError::Malformed("no JSON array in LLM output".into()))?;
    let total = items.len();
    let offers: Vec<OfferRecord> = items
        .into_iter()
        .filter_map(|v| serde_json::from_value::<DiscoveredCompany>(v).ok())
        .filter(|c| !c.name.trim().is_empty())
        .map(OfferRecord::from)
        .collect();
    if offers.len() < total {
        debug!(target: "sources", skipped = total - offers.len(), "discovery items skipped");
    }
    Ok(offers)
}

pub struct LlmDiscoverySource {
    llm: DynLlm,
    timeout: Duration,
}

impl LlmDiscoverySource {
    pub fn new(llm: DynLlm, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    fn prompt(query: &SourceQuery) -> String {
        let category = query
            .category
            .map(|c| c.label())
            .unwrap_or_else(|| "general".to_string());
        format!(
            "List up to {limit} real companies with affiliate programs relevant to \"{term}\" \
             (category: {category}).\n\
             Return a JSON array. Each item: {{\"name\", \"company\", \"description\", \
             \"commission_rate\", \"network\", \"website\", \"program_url\", \"cookie_duration\", \
             \"target_audience\": [], \"content_opportunities\": []}}.\n\
             Use the company's real brand name, never the topic itself.",
            limit = query.limit.min(15),
            term = query.term.trim(),
        )
    }
}

#[async_trait]
impl OfferSource for LlmDiscoverySource {
    fn name(&self) -> &'static str {
        "llm_discovery"
    }

    fn provenance(&self) -> Provenance {
        Provenance::LlmDiscovered
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<OfferRecord>, SourceError> {
        let req = CompletionRequest::new(Self::prompt(query))
            .system(SYSTEM)
            .max_tokens(2000)
            .temperature(0.3);
        let completion = self.llm.complete(&req).await.map_err(|e| match e {
            LlmError::Disabled | LlmError::MissingApiKey { .. } => SourceError::NotConfigured,
            other => SourceError::Llm(other),
        })?;
        let mut offers = parse_companies(&completion.content)?;
        for o in offers.iter_mut() {
            o.category = query.category;
        }
        offers.truncate(query.limit);
        Ok(offers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Category;
    use crate::llm::{DisabledClient, ScriptedLlm};
    use std::sync::Arc;

    const REPLY: &str = r#"Sure! Here are some programs:
```json
[
  {"name": "Coursera", "commission_rate": "15-45%", "network": "Impact",
   "website": "https://www.coursera.org", "cookie_duration": 30,
   "target_audience": ["students", "professionals"], "content_opportunities": "course reviews, career guides"},
  {"company_name": "Brilliant", "commission_rate": 20},
  {"description": "missing name"}
]
```"#;

    #[test]
    fn parses_fenced_array_and_loose_fields() {
        let offers = parse_companies(REPLY).unwrap();
        assert_eq!(offers.len(), 2);
        let c = &offers[0];
        assert_eq!(c.cookie_duration.as_deref(), Some("30 days"));
        assert_eq!(c.content_opportunities, vec!["course reviews", "career guides"]);
        assert_eq!(offers[1].name, "Brilliant");
        assert_eq!(offers[1].commission_rate, Some(CommissionRate::Percent(20.0)));
        assert!(offers.iter().all(|o| o.verification == Verification::Unverified));
    }

    #[test]
    fn prose_only_is_malformed() {
        assert!(matches!(
            parse_companies("I don't know any."),
            Err(SourceError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn search_tags_category() {
        let src = LlmDiscoverySource::new(Arc::new(ScriptedLlm::fixed(REPLY)), Duration::from_secs(5));
        let q = SourceQuery {
            term: "online courses".into(),
            category: Some(Category::Education),
            limit: 1,
        };
        let offers = src.search(&q).await.unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].category, Some(Category::Education));
    }

    #[tokio::test]
    async fn disabled_llm_is_not_configured() {
        let src = LlmDiscoverySource::new(Arc::new(DisabledClient), Duration::from_secs(5));
        let q = SourceQuery {
            term: "x".into(),
            category: None,
            limit: 3,
        };
        assert!(matches!(
            src.search(&q).await,
            Err(SourceError::NotConfigured)
        ));
    }
}
