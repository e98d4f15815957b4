//! Basic affiliate research: one topic in, ranked programs plus an analysis out.
//!
//! classify → gather (all four sources) → filter → dedupe → score → rank →
//! quality-first pass → persist → cache.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::{CacheKey, CacheStatus, ResultCache};
use crate::classify::{Category, CategoryClassifier};
use crate::config::ResearchConfig;
use crate::dedup;
use crate::error::ResearchError;
use crate::filter::{QualityFilter, Rejected};
use crate::offer::{OfferRecord, Provenance, ResearchRecord, ResearchStatus, UserPreferences};
use crate::scoring;
use crate::sources::{gather, GatherOutcome, SourceQuery, SourceReport, SourceSet};
use crate::store::DynStore;

pub const MAX_TERM_LEN: usize = 200;

/// Short stable id for a search term; raw user text stays out of the logs.
pub fn term_id(term: &str) -> String {
    CacheKey::from_parts(&[&term.trim().to_lowercase()])
        .short()
        .to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub search_term: String,
    #[serde(default)]
    pub niche: Option<String>,
    #[serde(default)]
    pub budget_range: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchAnalysis {
    pub research_id: String,
    pub category: Category,
    pub total_found: usize,
    pub filtered_out: usize,
    pub rejected: Vec<Rejected>,
    pub duplicates_removed: usize,
    /// Mean of the peak percentages among returned programs that state one.
    pub average_commission_percent: Option<f64>,
    pub networks: BTreeMap<String, usize>,
    pub top_program: Option<String>,
    pub sources: Vec<SourceReport>,
    pub degraded: bool,
    /// False when the quality-first pass put an offer ahead of a higher-scored one.
    pub ranking_consistent: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchData {
    pub programs: Vec<OfferRecord>,
    pub analysis: SearchAnalysis,
    pub total_programs: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub message: String,
    pub data: SearchData,
}

/// Result of the filter → dedupe → score → rank stages.
#[derive(Debug, Clone, Default)]
pub struct Refined {
    pub offers: Vec<OfferRecord>,
    pub total_found: usize,
    pub rejected: Vec<Rejected>,
    pub duplicates_removed: usize,
}

/// Shared post-gather stages. Returns every surviving offer ranked by score;
/// truncation is left to the caller.
pub fn refine(
    offers: Vec<OfferRecord>,
    terms: &[&str],
    prefs: Option<&UserPreferences>,
    filter: &QualityFilter,
) -> Refined {
    let total_found = offers.len();

    let filtered = filter.filter(offers, terms);
    if !filtered.rejected.is_empty() {
        counter!("research_filter_rejects_total").increment(filtered.rejected.len() as u64);
    }

    let deduped = dedup::dedupe(filtered.kept);
    if deduped.removed > 0 {
        counter!("research_dedup_removed_total").increment(deduped.removed as u64);
    }

    let scored: Vec<OfferRecord> = deduped
        .offers
        .into_iter()
        .map(|o| scoring::score(o, terms, prefs))
        .collect();

    let n = scored.len();
    Refined {
        offers: scoring::rank(scored, n),
        total_found,
        rejected: filtered.rejected,
        duplicates_removed: deduped.removed,
    }
}

/// Save newly discovered programs and bump usage of curated ones.
/// Failures here are logged and ignored.
pub async fn remember_programs(store: &DynStore, offers: &[OfferRecord]) {
    let discovered: Vec<OfferRecord> = offers
        .iter()
        .filter(|o| o.source != Provenance::Store)
        .cloned()
        .collect();
    if !discovered.is_empty() {
        match store.upsert_programs(&discovered).await {
            Ok(created) => info!(target: "research", created, "discovered programs saved"),
            Err(e) => warn!(target: "research", error = %e, "saving discovered programs failed"),
        }
    }

    let used: Vec<String> = offers
        .iter()
        .filter(|o| o.source == Provenance::Store)
        .map(|o| o.name.clone())
        .collect();
    if !used.is_empty() {
        if let Err(e) = store.record_usage(&used).await {
            warn!(target: "research", error = %e, "usage counter update failed");
        }
    }
}

fn clean_opt(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub struct AffiliateResearchService {
    classifier: CategoryClassifier,
    sources: SourceSet,
    store: DynStore,
    filter: QualityFilter,
    cache: ResultCache<SearchData>,
    config: Arc<ResearchConfig>,
}

impl AffiliateResearchService {
    pub fn new(
        classifier: CategoryClassifier,
        sources: SourceSet,
        store: DynStore,
        config: Arc<ResearchConfig>,
    ) -> Self {
        Self {
            classifier,
            sources,
            store,
            filter: QualityFilter::default(),
            cache: ResultCache::new("search", config.cache.ttl()),
            config,
        }
    }

    pub fn cache(&self) -> &ResultCache<SearchData> {
        &self.cache
    }

    pub async fn search(
        &self,
        req: SearchRequest,
    ) -> Result<(SearchResponse, CacheStatus), ResearchError> {
        let term = req.search_term.trim().to_string();
        if term.is_empty() {
            return Err(ResearchError::invalid("search_term must not be empty"));
        }
        if term.chars().count() > MAX_TERM_LEN {
            return Err(ResearchError::invalid(format!(
                "search_term must be at most {MAX_TERM_LEN} characters"
            )));
        }
        let req = SearchRequest {
            search_term: term,
            niche: clean_opt(req.niche),
            budget_range: clean_opt(req.budget_range),
            user_id: clean_opt(req.user_id),
        };

        let key = CacheKey::for_search(
            &req.search_term,
            req.niche.as_deref(),
            req.budget_range.as_deref(),
        );
        let started = Instant::now();
        let (data, status) = self
            .cache
            .get_or_compute(key, || self.run(&req))
            .await?;

        counter!("research_requests_total", "kind" => "search", "cache" => status.as_header())
            .increment(1);
        histogram!("research_pipeline_seconds", "kind" => "search")
            .record(started.elapsed().as_secs_f64());

        let message = format!(
            "Found {} affiliate programs for '{}'",
            data.total_programs, req.search_term
        );
        Ok((
            SearchResponse {
                success: true,
                message,
                data,
            },
            status,
        ))
    }

    async fn run(&self, req: &SearchRequest) -> Result<SearchData, ResearchError> {
        let term = req.search_term.as_str();
        let category = match req.niche.as_deref().and_then(Category::parse) {
            Some(c) => c,
            None => self.classifier.classify(term).await,
        };

        let query = SourceQuery {
            term: term.to_string(),
            category: Some(category),
            limit: self.config.source_limit,
        };
        let outcome: GatherOutcome =
            gather(&self.sources.all(), &query, self.config.timeouts.outer()).await;
        if outcome.all_failed() {
            return Err(ResearchError::AllSourcesFailed {
                reports: outcome.reports,
            });
        }
        let degraded = outcome.degraded();

        let prefs = match req.user_id.as_deref() {
            Some(uid) => self.store.get_preferences(uid).await.unwrap_or_else(|e| {
                warn!(target: "research", error = %e, "preferences unavailable");
                None
            }),
            None => None,
        };

        let refined = refine(outcome.offers, &[term], prefs.as_ref(), &self.filter);
        let (mut programs, ranking_consistent) = if self.config.quality_first {
            scoring::prioritize_known_networks(refined.offers)
        } else {
            (refined.offers, true)
        };
        if !ranking_consistent {
            warn!(
                target: "research",
                term = %term_id(term),
                "quality-first pass reordered offers against their scores"
            );
        }
        programs.truncate(self.config.default_max_offers);

        remember_programs(&self.store, &programs).await;

        let now = Utc::now();
        let research_id = uuid::Uuid::new_v4().to_string();
        self.store
            .insert_research(ResearchRecord {
                id: research_id.clone(),
                user_id: req.user_id.clone(),
                search_term: term.to_string(),
                niche: req.niche.clone(),
                budget_range: req.budget_range.clone(),
                category,
                results: programs.clone(),
                status: ResearchStatus::Completed,
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!(
            target: "research",
            term = %term_id(term),
            category = category.as_str(),
            found = refined.total_found,
            kept = programs.len(),
            degraded,
            "search completed"
        );

        let analysis = SearchAnalysis {
            research_id,
            category,
            total_found: refined.total_found,
            filtered_out: refined.rejected.len(),
            rejected: refined.rejected,
            duplicates_removed: refined.duplicates_removed,
            average_commission_percent: average_commission(&programs),
            networks: network_breakdown(&programs),
            top_program: programs.first().map(|o| o.name.clone()),
            sources: outcome.reports,
            degraded,
            ranking_consistent,
        };
        Ok(SearchData {
            total_programs: programs.len(),
            programs,
            analysis,
            timestamp: now,
        })
    }
}

fn average_commission(offers: &[OfferRecord]) -> Option<f64> {
    let peaks: Vec<f64> = offers
        .iter()
        .filter_map(|o| o.commission_rate.as_ref()?.peak_percent())
        .collect();
    if peaks.is_empty() {
        return None;
    }
    let avg = peaks.iter().sum::<f64>() / peaks.len() as f64;
    Some((avg * 10.0).round() / 10.0)
}

fn network_breakdown(offers: &[OfferRecord]) -> BTreeMap<String, usize> {
    let mut out = BTreeMap::new();
    for o in offers {
        let label = match o.network.as_deref() {
            Some(n) => crate::networks::canonical_display(n)
                .map(str::to_string)
                .unwrap_or_else(|| n.trim().to_string()),
            None => "Direct".to_string(),
        };
        *out.entry(label).or_insert(0) += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::CommissionRate;

    fn offer(name: &str, network: Option<&str>, commission: Option<&str>) -> OfferRecord {
        let mut o = OfferRecord::new(name, Provenance::LlmDiscovered);
        o.network = network.map(str::to_string);
        o.commission_rate = commission.map(|c| CommissionRate::Text(c.into()));
        o
    }

    #[test]
    fn refine_filters_dedupes_and_ranks() {
        let r = refine(
            vec![
                offer("Coursera Affiliate Program", Some("CJ Affiliate"), Some("15-25%")),
                offer("Quantum Computing Courses Solutions LLC", None, None),
                offer("Coursera Affiliate Program", Some("CJ Affiliate"), Some("15-25%")),
                offer("edX", None, None),
            ],
            &["quantum computing courses"],
            None,
            &QualityFilter::default(),
        );
        assert_eq!(r.total_found, 4);
        assert_eq!(r.rejected.len(), 1);
        assert_eq!(r.duplicates_removed, 1);
        assert_eq!(r.offers[0].name, "Coursera Affiliate Program");
        assert!(scoring::is_score_ordered(&r.offers));
    }

    #[test]
    fn analysis_helpers() {
        let offers = vec![
            offer("A", Some("commission junction"), Some("10-20%")),
            offer("B", None, Some("5%")),
            offer("C", Some("Acme Partners"), None),
        ];
        assert_eq!(average_commission(&offers), Some(12.5));
        let nets = network_breakdown(&offers);
        assert_eq!(nets.get("CJ Affiliate"), Some(&1));
        assert_eq!(nets.get("Direct"), Some(&1));
        assert_eq!(nets.get("Acme Partners"), Some(&1));
        assert_eq!(average_commission(&[]), None);
    }

    #[test]
    fn term_id_is_case_insensitive_and_short() {
        assert_eq!(term_id("Camping "), term_id("camping"));
        assert_eq!(term_id("x").len(), 12);
    }
}
