// tests/support/mod.rs
//
// Shared fixtures for the HTTP/pipeline tests: a configurable in-process
// offer source and a router builder that wires stubs instead of network calls.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, Response},
    Router,
};
use serde_json::Value as Json;

use affiliate_research::app::build_state;
use affiliate_research::config::ResearchConfig;
use affiliate_research::error::SourceError;
use affiliate_research::llm::{DisabledClient, DynLlm};
use affiliate_research::offer::{CommissionRate, OfferRecord, Provenance};
use affiliate_research::sources::{DynSource, OfferSource, SourceQuery, SourceSet};
use affiliate_research::store::{DynStore, MemoryStore};
use affiliate_research::AppState;

pub const BODY_LIMIT: usize = 1024 * 1024;

pub enum Reply {
    Offers(Vec<OfferRecord>),
    Fail,
    NotConfigured,
}

/// Source returning a fixed reply after an optional delay; counts its calls.
pub struct StubSource {
    name: &'static str,
    provenance: Provenance,
    reply: Reply,
    delay: Duration,
    timeout: Duration,
    calls: AtomicUsize,
}

impl StubSource {
    pub fn new(name: &'static str, provenance: Provenance, reply: Reply) -> Self {
        Self {
            name,
            provenance,
            reply,
            delay: Duration::ZERO,
            timeout: Duration::from_secs(30),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn delayed(mut self, delay: Duration, timeout: Duration) -> Self {
        self.delay = delay;
        self.timeout = timeout;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OfferSource for StubSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn provenance(&self) -> Provenance {
        self.provenance
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn search(&self, _query: &SourceQuery) -> Result<Vec<OfferRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.reply {
            Reply::Offers(o) => Ok(o.clone()),
            Reply::Fail => Err(SourceError::Status { status: 503 }),
            Reply::NotConfigured => Err(SourceError::NotConfigured),
        }
    }
}

pub fn offer(name: &str, commission: Option<&str>, network: Option<&str>) -> OfferRecord {
    let mut o = OfferRecord::new(name, Provenance::AffiliateApi);
    o.commission_rate = commission.map(|c| CommissionRate::Text(c.to_string()));
    o.network = network.map(str::to_string);
    o
}

pub fn coursera() -> OfferRecord {
    let mut o = offer("Coursera Affiliate Program", Some("15-25%"), Some("CJ Affiliate"));
    o.website = Some("https://www.coursera.org".into());
    o.description = Some("Online courses and certificates from top universities".into());
    o
}

/// One set of four stub sources, all of them returning `reply` built fresh.
pub fn uniform_sources(reply: impl Fn() -> Reply) -> (SourceSet, Vec<Arc<StubSource>>) {
    let stubs = vec![
        Arc::new(StubSource::new("store", Provenance::Store, reply())),
        Arc::new(StubSource::new("affiliate_api", Provenance::AffiliateApi, reply())),
        Arc::new(StubSource::new("web_search", Provenance::WebSearch, reply())),
        Arc::new(StubSource::new("llm", Provenance::LlmDiscovered, reply())),
    ];
    (set_of(&stubs), stubs)
}

pub fn set_of(stubs: &[Arc<StubSource>]) -> SourceSet {
    let dyn_of = |i: usize| stubs[i].clone() as DynSource;
    SourceSet {
        store: dyn_of(0),
        api: dyn_of(1),
        web: dyn_of(2),
        llm: dyn_of(3),
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: DynStore,
}

pub fn test_app(sources: SourceSet) -> TestApp {
    test_app_with(sources, Arc::new(DisabledClient), ResearchConfig::default())
}

pub fn test_app_with(sources: SourceSet, llm: DynLlm, config: ResearchConfig) -> TestApp {
    let store: DynStore = Arc::new(MemoryStore::new());
    let state: AppState = build_state(llm, store.clone(), sources, Arc::new(config));
    TestApp {
        router: affiliate_research::router(state),
        store,
    }
}

pub fn post_json(uri: &str, body: &Json) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("build POST")
}

pub fn put_json(uri: &str, body: &Json) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("build PUT")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build GET")
}

pub async fn json_body(resp: Response<Body>) -> Json {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}
