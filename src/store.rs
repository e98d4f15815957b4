//! Persistence seam.
//!
//! `Store` is the document store behind the services: the program catalogue,
//! research records, user preferences and generated content ideas.
//! `MemoryStore` is the in-process implementation used by the binary and the
//! tests; it can be seeded from a JSON file of curated programs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::classify::Category;
use crate::content_ideas::ContentIdea;
use crate::error::StoreError;
use crate::networks;
use crate::offer::{CommissionRate, OfferRecord, Provenance, ResearchRecord, UserPreferences, Verification};

#[async_trait]
pub trait Store: Send + Sync {
    /// Case-insensitive substring match against name, description, company and
    /// category label, most-used first.
    async fn search_programs(&self, term: &str, limit: usize) -> Result<Vec<OfferRecord>, StoreError>;

    /// Insert or merge by normalized name. Returns how many rows were new.
    async fn upsert_programs(&self, offers: &[OfferRecord]) -> Result<usize, StoreError>;

    /// Bump the usage counter of each named program that exists.
    async fn record_usage(&self, names: &[String]) -> Result<(), StoreError>;

    async fn insert_research(&self, record: ResearchRecord) -> Result<(), StoreError>;

    /// Newest first; `user_id = None` lists everything.
    async fn list_research(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ResearchRecord>, StoreError>;

    async fn get_research(&self, id: &str) -> Result<ResearchRecord, StoreError>;

    async fn get_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>, StoreError>;

    async fn upsert_preferences(&self, prefs: UserPreferences) -> Result<(), StoreError>;

    async fn insert_content_ideas(&self, ideas: &[ContentIdea]) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_content_ideas(&self, user_id: &str) -> Result<Vec<ContentIdea>, StoreError>;
}

pub type DynStore = Arc<dyn Store>;

/// Curated program as written in `config/programs.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedProgram {
    pub name: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub commission_rate: Option<CommissionRate>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub program_url: Option<String>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub target_audience: Vec<String>,
    #[serde(default)]
    pub content_opportunities: Vec<String>,
    #[serde(default)]
    pub cookie_duration: Option<String>,
    #[serde(default)]
    pub epc: Option<f64>,
}

impl From<SeedProgram> for OfferRecord {
    fn from(p: SeedProgram) -> Self {
        let mut o = OfferRecord::new(p.name, Provenance::Store);
        o.company = p.company;
        o.description = p.description;
        o.commission_rate = p.commission_rate;
        o.network = p.network;
        o.website = p.website;
        o.program_url = p.program_url;
        o.category = p.category;
        o.target_audience = p.target_audience;
        o.content_opportunities = p.content_opportunities;
        o.cookie_duration = p.cookie_duration;
        o.epc = p.epc;
        o.verification = Verification::Verified;
        o
    }
}

struct ProgramRow {
    offer: OfferRecord,
    usage: u64,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    programs: HashMap<String, ProgramRow>,
    next_seq: u64,
    research: Vec<ResearchRecord>,
    preferences: HashMap<String, UserPreferences>,
    ideas: Vec<ContentIdea>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

fn program_key(name: &str) -> String {
    networks::normalize(name)
}

/// Fill fields the existing row lacks; never overwrite curated data.
fn merge_into(existing: &mut OfferRecord, incoming: &OfferRecord) {
    fn fill<T: Clone>(slot: &mut Option<T>, from: &Option<T>) {
        if slot.is_none() {
            slot.clone_from(from);
        }
    }
    fill(&mut existing.company, &incoming.company);
    fill(&mut existing.description, &incoming.description);
    if !existing.has_commission() && incoming.has_commission() {
        existing.commission_rate.clone_from(&incoming.commission_rate);
    }
    fill(&mut existing.network, &incoming.network);
    fill(&mut existing.website, &incoming.website);
    fill(&mut existing.program_url, &incoming.program_url);
    fill(&mut existing.category, &incoming.category);
    fill(&mut existing.cookie_duration, &incoming.cookie_duration);
    fill(&mut existing.epc, &incoming.epc);
    if existing.target_audience.is_empty() {
        existing.target_audience.clone_from(&incoming.target_audience);
    }
    if existing.content_opportunities.is_empty() {
        existing
            .content_opportunities
            .clone_from(&incoming.content_opportunities);
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with `programs`, all marked verified.
    pub fn with_programs(programs: Vec<OfferRecord>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.write();
            for mut p in programs {
                p.source = Provenance::Store;
                p.verification = Verification::Verified;
                p.scores = None;
                insert_row(&mut inner, p);
            }
        }
        store
    }

    pub fn from_seed_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading seed programs from {}", path.display()))?;
        let seeds: Vec<SeedProgram> =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        let n = seeds.len();
        let store = Self::with_programs(seeds.into_iter().map(OfferRecord::from).collect());
        info!(target: "store", programs = n, path = %path.display(), "seed programs loaded");
        Ok(store)
    }

    pub fn program_count(&self) -> usize {
        self.read().programs.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        match self.inner.read() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        match self.inner.write() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }
}

fn insert_row(inner: &mut Inner, offer: OfferRecord) -> bool {
    let key = program_key(&offer.name);
    if key.is_empty() {
        return false;
    }
    if let Some(row) = inner.programs.get_mut(&key) {
        merge_into(&mut row.offer, &offer);
        return false;
    }
    let seq = inner.next_seq;
    inner.next_seq += 1;
    inner.programs.insert(key, ProgramRow { offer, usage: 0, seq });
    true
}

fn matches_term(o: &OfferRecord, term: &str) -> bool {
    let hay = [
        Some(o.name.to_lowercase()),
        o.description.as_deref().map(str::to_lowercase),
        o.company.as_deref().map(str::to_lowercase),
        o.category.map(|c| c.label()),
    ];
    hay.iter().flatten().any(|h| h.contains(term))
}

#[async_trait]
impl Store for MemoryStore {
    async fn search_programs(&self, term: &str, limit: usize) -> Result<Vec<OfferRecord>, StoreError> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        let inner = self.read();
        let mut rows: Vec<&ProgramRow> = inner
            .programs
            .values()
            .filter(|r| matches_term(&r.offer, &term))
            .collect();
        rows.sort_by(|a, b| b.usage.cmp(&a.usage).then(a.seq.cmp(&b.seq)));
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|r| {
                let mut o = r.offer.clone();
                o.source = Provenance::Store;
                o
            })
            .collect())
    }

    async fn upsert_programs(&self, offers: &[OfferRecord]) -> Result<usize, StoreError> {
        let mut inner = self.write();
        let mut created = 0;
        for o in offers {
            let mut row = o.clone();
            row.scores = None;
            row.personalization_reasons.clear();
            if insert_row(&mut inner, row) {
                created += 1;
            }
        }
        Ok(created)
    }

    async fn record_usage(&self, names: &[String]) -> Result<(), StoreError> {
        let mut inner = self.write();
        for n in names {
            if let Some(row) = inner.programs.get_mut(&program_key(n)) {
                row.usage += 1;
            }
        }
        Ok(())
    }

    async fn insert_research(&self, record: ResearchRecord) -> Result<(), StoreError> {
        self.write().research.push(record);
        Ok(())
    }

    async fn list_research(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ResearchRecord>, StoreError> {
        let inner = self.read();
        Ok(inner
            .research
            .iter()
            .rev()
            .filter(|r| user_id.is_none() || r.user_id.as_deref() == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_research(&self, id: &str) -> Result<ResearchRecord, StoreError> {
        self.read()
            .research
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                what: format!("research {id}"),
            })
    }

    async fn get_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>, StoreError> {
        Ok(self.read().preferences.get(user_id).cloned())
    }

    async fn upsert_preferences(&self, prefs: UserPreferences) -> Result<(), StoreError> {
        self.write().preferences.insert(prefs.user_id.clone(), prefs);
        Ok(())
    }

    async fn insert_content_ideas(&self, ideas: &[ContentIdea]) -> Result<(), StoreError> {
        self.write().ideas.extend(ideas.iter().cloned());
        Ok(())
    }

    async fn list_content_ideas(&self, user_id: &str) -> Result<Vec<ContentIdea>, StoreError> {
        Ok(self
            .read()
            .ideas
            .iter()
            .rev()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect())
    }
}
