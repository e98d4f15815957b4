//! Offer sources and the scatter/gather step.
//!
//! Every source runs concurrently. Each one gets its own deadline
//! (`min(start + inner, start + outer)`), so a slow source never drags the
//! others past the outer bound and whatever finished in time is kept. Every
//! source yields a `SourceReport`, including the ones that failed.

pub mod affiliate_api;
pub mod linkup;
pub mod llm_discovery;
pub mod store;
pub mod web_search;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use metrics::counter;
use serde::Serialize;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::classify::Category;
use crate::error::SourceError;
use crate::offer::{OfferRecord, Provenance, Verification};

pub use affiliate_api::{AffiliateApiSource, OfferSearchApi};
pub use linkup::LinkupClient;
pub use llm_discovery::LlmDiscoverySource;
pub use store::StoreSource;
pub use web_search::{SearchHit, WebSearchBackend, WebSearchSource};

#[derive(Debug, Clone)]
pub struct SourceQuery {
    pub term: String,
    pub category: Option<Category>,
    pub limit: usize,
}

#[async_trait]
pub trait OfferSource: Send + Sync {
    /// Short stable name used in reports, logs and metric labels.
    fn name(&self) -> &'static str;
    fn provenance(&self) -> Provenance;
    /// Inner bound for one `search` call.
    fn timeout(&self) -> Duration;
    async fn search(&self, query: &SourceQuery) -> Result<Vec<OfferRecord>, SourceError>;
}

pub type DynSource = Arc<dyn OfferSource>;

/// The four fetchers, built once at startup and shared by both services.
#[derive(Clone)]
pub struct SourceSet {
    pub store: DynSource,
    pub api: DynSource,
    pub web: DynSource,
    pub llm: DynSource,
}

impl SourceSet {
    pub fn all(&self) -> Vec<DynSource> {
        vec![
            self.store.clone(),
            self.api.clone(),
            self.web.clone(),
            self.llm.clone(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Ok,
    Empty,
    Failed,
    TimedOut,
    NotConfigured,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Ok => "ok",
            SourceStatus::Empty => "empty",
            SourceStatus::Failed => "failed",
            SourceStatus::TimedOut => "timed_out",
            SourceStatus::NotConfigured => "not_configured",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SourceStatus::Failed | SourceStatus::TimedOut)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub status: SourceStatus,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct GatherOutcome {
    pub offers: Vec<OfferRecord>,
    pub reports: Vec<SourceReport>,
}

impl GatherOutcome {
    /// At least one source was attempted and every attempted one failed.
    /// Unconfigured sources are not attempts.
    pub fn all_failed(&self) -> bool {
        let mut attempted = self
            .reports
            .iter()
            .filter(|r| r.status != SourceStatus::NotConfigured)
            .peekable();
        attempted.peek().is_some() && attempted.all(|r| r.status.is_failure())
    }

    /// Any attempted source failed or timed out.
    pub fn degraded(&self) -> bool {
        self.reports.iter().any(|r| r.status.is_failure())
    }

    pub fn merge(&mut self, other: GatherOutcome) {
        self.offers.extend(other.offers);
        self.reports.extend(other.reports);
    }
}

/// Run every source against `query`; offers come back in source order.
pub async fn gather(sources: &[DynSource], query: &SourceQuery, outer: Duration) -> GatherOutcome {
    let start = Instant::now();
    let outer_deadline = start + outer;

    let runs = sources.iter().map(|src| {
        let deadline = (start + src.timeout()).min(outer_deadline);
        async move {
            let t0 = Instant::now();
            let res = timeout_at(deadline, src.search(query)).await;
            let elapsed_ms = t0.elapsed().as_millis() as u64;
            settle(src.as_ref(), res.map_err(|_| deadline - start), elapsed_ms)
        }
    });

    let mut out = GatherOutcome::default();
    for (offers, report) in join_all(runs).await {
        out.offers.extend(offers);
        out.reports.push(report);
    }
    out
}

fn settle(
    src: &dyn OfferSource,
    res: Result<Result<Vec<OfferRecord>, SourceError>, Duration>,
    elapsed_ms: u64,
) -> (Vec<OfferRecord>, SourceReport) {
    let name = src.name();
    let (offers, status, error) = match res {
        Ok(Ok(mut offers)) => {
            let provenance = src.provenance();
            for o in offers.iter_mut() {
                o.source = provenance;
                if matches!(provenance, Provenance::LlmDiscovered | Provenance::WebSearch) {
                    o.verification = Verification::Unverified;
                }
            }
            let status = if offers.is_empty() {
                SourceStatus::Empty
            } else {
                SourceStatus::Ok
            };
            (offers, status, None)
        }
        Ok(Err(SourceError::NotConfigured)) => (Vec::new(), SourceStatus::NotConfigured, None),
        Ok(Err(e)) => (Vec::new(), SourceStatus::Failed, Some(e.to_string())),
        Err(bound) => {
            let e = SourceError::Timeout {
                secs: bound.as_secs(),
            };
            (Vec::new(), SourceStatus::TimedOut, Some(e.to_string()))
        }
    };

    counter!("research_source_requests_total", "source" => name, "status" => status.as_str())
        .increment(1);
    counter!("research_source_offers_total", "source" => name).increment(offers.len() as u64);

    if status.is_failure() {
        warn!(
            target: "sources",
            source = name,
            status = status.as_str(),
            error = error.as_deref().unwrap_or_default(),
            elapsed_ms,
            "source degraded"
        );
    } else {
        debug!(target: "sources", source = name, status = status.as_str(), count = offers.len(), elapsed_ms, "source done");
    }

    let report = SourceReport {
        source: name.to_string(),
        status,
        count: offers.len(),
        error,
        elapsed_ms,
    };
    (offers, report)
}
