// src/app.rs
//! Bootstrap: configs → LLM client, store, sources → services → router.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tracing::{info, warn};

use crate::api::{self, AppState};
use crate::classify::CategoryClassifier;
use crate::config::{AiConfig, ResearchConfig};
use crate::content_ideas::ContentIdeaGenerator;
use crate::enhanced::EnhancedAffiliateResearchService;
use crate::llm::{build_client_from_config, DynLlm};
use crate::metrics::Metrics;
use crate::research::AffiliateResearchService;
use crate::sources::{
    AffiliateApiSource, LinkupClient, LlmDiscoverySource, OfferSearchApi, SourceSet, StoreSource,
    WebSearchBackend, WebSearchSource,
};
use crate::store::{DynStore, MemoryStore};

/// Program store from the configured seed file; a missing file gives an empty store.
pub fn build_store(config: &ResearchConfig) -> anyhow::Result<DynStore> {
    let store = match config.seed_programs_path.as_deref() {
        Some(path) if path.exists() => MemoryStore::from_seed_file(path)?,
        Some(path) => {
            warn!(target: "store", path = %path.display(), "seed programs file not found, starting empty");
            MemoryStore::new()
        }
        None => MemoryStore::new(),
    };
    Ok(Arc::new(store))
}

/// The four fetchers wired with the configured timeouts. LinkUp backs both the
/// offer API and web search when a key is available; otherwise those two
/// sources report `not_configured`.
pub fn build_sources(
    config: &ResearchConfig,
    store: DynStore,
    llm: DynLlm,
) -> anyhow::Result<SourceSet> {
    let t = &config.timeouts;
    let secs = Duration::from_secs;

    let linkup = match config.linkup_api_key() {
        Some(key) => Some(Arc::new(
            LinkupClient::new(config.linkup.base_url.clone(), key)
                .context("building LinkUp client")?,
        )),
        None => {
            if config.linkup.enabled {
                warn!(target: "sources", "LinkUp enabled but no API key, offer API disabled");
            }
            None
        }
    };
    let api: Option<Arc<dyn OfferSearchApi>> = linkup
        .clone()
        .map(|c| c as Arc<dyn OfferSearchApi>);
    let web: Option<Arc<dyn WebSearchBackend>> = linkup
        .filter(|_| config.linkup.use_for_web_search)
        .map(|c| c as Arc<dyn WebSearchBackend>);

    info!(
        target: "sources",
        offer_api = api.is_some(),
        web_search = web.is_some(),
        "sources configured"
    );

    Ok(SourceSet {
        store: Arc::new(StoreSource::new(store, secs(t.store_secs))),
        api: Arc::new(AffiliateApiSource::new(api, secs(t.api_secs))),
        web: Arc::new(WebSearchSource::new(web, secs(t.web_secs))),
        llm: Arc::new(LlmDiscoverySource::new(llm, secs(t.llm_secs))),
    })
}

/// Services over already-built collaborators. Tests inject stub sources here.
pub fn build_state(
    llm: DynLlm,
    store: DynStore,
    sources: SourceSet,
    config: Arc<ResearchConfig>,
) -> AppState {
    let classifier = CategoryClassifier::new(llm.clone());
    AppState {
        research: Arc::new(AffiliateResearchService::new(
            classifier.clone(),
            sources.clone(),
            store.clone(),
            config.clone(),
        )),
        enhanced: Arc::new(EnhancedAffiliateResearchService::new(
            classifier.clone(),
            sources,
            store.clone(),
            config,
        )),
        ideas: Arc::new(ContentIdeaGenerator::new(llm, store.clone())),
        classifier,
        store,
    }
}

/// Router with the API and `/metrics`.
pub fn router_with_metrics(state: AppState, config: &ResearchConfig) -> anyhow::Result<Router> {
    let metrics = Metrics::init(config.cache.ttl_secs)?;
    Ok(api::router(state).merge(metrics.router()))
}

/// Full app from `config/ai.json`, `config/research.toml` and the environment.
pub async fn app() -> anyhow::Result<Router> {
    let ai = AiConfig::load_default()?;
    let research = Arc::new(ResearchConfig::load_default()?);
    // Safe diagnostics: provider + enabled + key length only
    info!(
        target: "llm",
        provider = %ai.provider,
        enabled = ai.enabled,
        key_len = ai.api_key.len(),
        "AI config loaded"
    );

    let llm = build_client_from_config(&ai);
    let store = build_store(&research)?;
    let sources = build_sources(&research, store.clone(), llm.clone())?;
    let state = build_state(llm, store, sources, research.clone());
    router_with_metrics(state, &research)
}
