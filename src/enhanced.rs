//! Enhanced discovery: several search terms, a research scope that selects the
//! sources, per-user personalization and cache management.
//!
//! Ranking is by score alone; there is no quality-first pass here.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::{CacheKey, CacheStats, CacheStatus, ResultCache};
use crate::classify::{Category, CategoryClassifier};
use crate::config::ResearchConfig;
use crate::error::ResearchError;
use crate::filter::QualityFilter;
use crate::offer::{OfferRecord, PreferencesUpdate, ResearchRecord, ResearchStatus, UserPreferences};
use crate::research::{refine, remember_programs, term_id, MAX_TERM_LEN};
use crate::sources::{gather, DynSource, GatherOutcome, SourceQuery, SourceReport, SourceSet};
use crate::store::DynStore;

pub const MAX_SEARCH_TERMS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchScope {
    /// Store and offer API.
    Quick,
    /// Quick plus LLM discovery.
    #[default]
    Comprehensive,
    /// All four sources.
    Deep,
}

impl ResearchScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchScope::Quick => "quick",
            ResearchScope::Comprehensive => "comprehensive",
            ResearchScope::Deep => "deep",
        }
    }

    pub fn select(&self, set: &SourceSet) -> Vec<DynSource> {
        match self {
            ResearchScope::Quick => vec![set.store.clone(), set.api.clone()],
            ResearchScope::Comprehensive => {
                vec![set.store.clone(), set.api.clone(), set.llm.clone()]
            }
            ResearchScope::Deep => set.all(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverRequest {
    pub search_terms: Vec<String>,
    #[serde(default)]
    pub research_scope: ResearchScope,
    #[serde(default)]
    pub max_offers: Option<usize>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoverResponse {
    pub success: bool,
    pub research_id: String,
    pub search_terms: Vec<String>,
    pub research_scope: ResearchScope,
    pub categories: Vec<Category>,
    pub offers: Vec<OfferRecord>,
    pub total_found: usize,
    pub filtered_out: usize,
    pub duplicates_removed: usize,
    pub personalized: bool,
    pub sources: Vec<SourceReport>,
    pub degraded: bool,
    pub timestamp: DateTime<Utc>,
}

/// Validated form of a `DiscoverRequest`.
#[derive(Debug, Clone)]
struct Discover {
    terms: Vec<String>,
    scope: ResearchScope,
    max_offers: usize,
    user_id: Option<String>,
}

impl Discover {
    fn cache_key(&self) -> CacheKey {
        let mut terms: Vec<String> = self.terms.iter().map(|t| t.to_lowercase()).collect();
        terms.sort();
        let max = self.max_offers.to_string();
        CacheKey::from_parts(&[
            &terms.join(","),
            self.scope.as_str(),
            &max,
            self.user_id.as_deref().unwrap_or("anonymous"),
        ])
    }
}

pub struct EnhancedAffiliateResearchService {
    classifier: CategoryClassifier,
    sources: SourceSet,
    store: DynStore,
    filter: QualityFilter,
    cache: ResultCache<DiscoverResponse>,
    config: Arc<ResearchConfig>,
}

impl EnhancedAffiliateResearchService {
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
            cache: ResultCache::new("discover", config.cache.ttl()),
            config,
        }
    }

    fn validate(&self, req: DiscoverRequest) -> Result<Discover, ResearchError> {
        let mut terms: Vec<String> = Vec::new();
        for t in req.search_terms {
            let t = t.trim().to_string();
            if t.is_empty() || terms.iter().any(|k| k.eq_ignore_ascii_case(&t)) {
                continue;
            }
            if t.chars().count() > MAX_TERM_LEN {
                return Err(ResearchError::invalid(format!(
                    "search terms must be at most {MAX_TERM_LEN} characters"
                )));
            }
            terms.push(t);
        }
        if terms.is_empty() {
            return Err(ResearchError::invalid("search_terms must contain a non-empty term"));
        }
        if terms.len() > MAX_SEARCH_TERMS {
            return Err(ResearchError::invalid(format!(
                "at most {MAX_SEARCH_TERMS} search terms are allowed"
            )));
        }
        let max_offers = match req.max_offers {
            Some(0) => return Err(ResearchError::invalid("max_offers must be at least 1")),
            Some(n) => n.min(self.config.max_offers_limit),
            None => self.config.default_max_offers,
        };
        Ok(Discover {
            terms,
            scope: req.research_scope,
            max_offers,
            user_id: req
                .user_id
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
        })
    }

    pub async fn discover(
        &self,
        req: DiscoverRequest,
    ) -> Result<(DiscoverResponse, CacheStatus), ResearchError> {
        let req = self.validate(req)?;
        let started = Instant::now();
        let (resp, status) = self
            .cache
            .get_or_compute_owned(req.cache_key(), req.user_id.as_deref(), || self.run(&req))
            .await?;
        counter!("research_requests_total", "kind" => "discover", "cache" => status.as_header())
            .increment(1);
        histogram!("research_pipeline_seconds", "kind" => "discover")
            .record(started.elapsed().as_secs_f64());
        Ok((resp, status))
    }

    async fn run(&self, req: &Discover) -> Result<DiscoverResponse, ResearchError> {
        let sources = req.scope.select(&self.sources);
        let outer = self.config.timeouts.outer();
        let limit = self.config.source_limit;

        let per_term = join_all(req.terms.iter().map(|term| {
            let sources = &sources;
            async move {
                let category = self.classifier.classify(term).await;
                let query = SourceQuery {
                    term: term.clone(),
                    category: Some(category),
                    limit,
                };
                (category, gather(sources, &query, outer).await)
            }
        }))
        .await;

        let mut categories = Vec::new();
        let mut outcome = GatherOutcome::default();
        for (cat, o) in per_term {
            if !categories.contains(&cat) {
                categories.push(cat);
            }
            outcome.merge(o);
        }
        if outcome.all_failed() {
            return Err(ResearchError::AllSourcesFailed {
                reports: outcome.reports,
            });
        }
        let degraded = outcome.degraded();

        let prefs = match req.user_id.as_deref() {
            Some(uid) => Some(self.preferences(uid).await?),
            None => None,
        };
        let personalized = prefs.as_ref().is_some_and(|p| !p.is_empty());

        let terms: Vec<&str> = req.terms.iter().map(String::as_str).collect();
        let refined = refine(outcome.offers, &terms, prefs.as_ref(), &self.filter);
        let mut offers = refined.offers;
        offers.truncate(req.max_offers);

        remember_programs(&self.store, &offers).await;

        let now = Utc::now();
        let research_id = uuid::Uuid::new_v4().to_string();
        self.store
            .insert_research(ResearchRecord {
                id: research_id.clone(),
                user_id: req.user_id.clone(),
                search_term: req.terms.join(", "),
                niche: None,
                budget_range: None,
                category: categories.first().copied().unwrap_or(Category::General),
                results: offers.clone(),
                status: ResearchStatus::Completed,
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!(
            target: "research",
            terms = ?req.terms.iter().map(|t| term_id(t)).collect::<Vec<_>>(),
            scope = req.scope.as_str(),
            found = refined.total_found,
            kept = offers.len(),
            personalized,
            degraded,
            "discovery completed"
        );

        Ok(DiscoverResponse {
            success: true,
            research_id,
            search_terms: req.terms.clone(),
            research_scope: req.scope,
            categories,
            total_found: refined.total_found,
            filtered_out: refined.rejected.len(),
            duplicates_removed: refined.duplicates_removed,
            personalized,
            sources: outcome.reports,
            degraded,
            offers,
            timestamp: now,
        })
    }

    /// Preferences for `user_id`, created with defaults on first access.
    pub async fn preferences(&self, user_id: &str) -> Result<UserPreferences, ResearchError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(ResearchError::invalid("user_id must not be empty"));
        }
        if let Some(p) = self.store.get_preferences(user_id).await? {
            return Ok(p);
        }
        let fresh = UserPreferences::defaults_for(user_id);
        self.store.upsert_preferences(fresh.clone()).await?;
        info!(target: "research", "default preferences created");
        Ok(fresh)
    }

    pub async fn update_preferences(
        &self,
        user_id: &str,
        update: PreferencesUpdate,
    ) -> Result<UserPreferences, ResearchError> {
        let mut prefs = self.preferences(user_id).await?;
        update.apply(&mut prefs);
        self.store.upsert_preferences(prefs.clone()).await?;
        // Cached discoveries for this user were ranked with the old preferences.
        let evicted = self.cache.invalidate_owner(user_id.trim());
        info!(target: "research", evicted, "preferences updated");
        Ok(prefs)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop the cached result for one request shape. Returns whether one existed.
    pub fn clear_cache(&self, req: DiscoverRequest) -> Result<bool, ResearchError> {
        let req = self.validate(req)?;
        Ok(self.cache.invalidate(&req.cache_key()))
    }

    pub fn clear_all_cache(&self) -> usize {
        self.cache.invalidate_all()
    }
}
