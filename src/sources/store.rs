use std::time::Duration;

use async_trait::async_trait;

use super::{OfferSource, SourceQuery};
use crate::error::SourceError;
use crate::offer::{OfferRecord, Provenance};
use crate::store::DynStore;

/// Curated programs already in the store.
pub struct StoreSource {
    store: DynStore,
    timeout: Duration,
}

impl StoreSource {
    pub fn new(store: DynStore, timeout: Duration) -> Self {
        Self { store, timeout }
    }
}

#[async_trait]
impl OfferSource for StoreSource {
    fn name(&self) -> &'static str {
        "store"
    }

    fn provenance(&self) -> Provenance {
        Provenance::Store
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<OfferRecord>, SourceError> {
        let mut hits = self.store.search_programs(&query.term, query.limit).await?;
        // A multi-word topic rarely appears verbatim; fall back to the category.
        if hits.is_empty() {
            if let Some(cat) = query.category {
                hits = self.store.search_programs(&cat.label(), query.limit).await?;
            }
        }
        Ok(hits)
    }
}
