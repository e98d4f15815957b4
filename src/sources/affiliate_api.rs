//! Third-party offer search API (LinkUp in production).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{OfferSource, SourceQuery};
use crate::error::SourceError;
use crate::offer::{OfferRecord, Provenance};

#[async_trait]
pub trait OfferSearchApi: Send + Sync {
    async fn search_offers(&self, query: &SourceQuery) -> Result<Vec<OfferRecord>, SourceError>;
}

pub struct AffiliateApiSource {
    client: Option<Arc<dyn OfferSearchApi>>,
    timeout: Duration,
}

impl AffiliateApiSource {
    pub fn new(client: Option<Arc<dyn OfferSearchApi>>, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl OfferSource for AffiliateApiSource {
    fn name(&self) -> &'static str {
        "affiliate_api"
    }

    fn provenance(&self) -> Provenance {
        Provenance::AffiliateApi
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<OfferRecord>, SourceError> {
        let client = self.client.as_ref().ok_or(SourceError::NotConfigured)?;
        let mut offers = client.search_offers(query).await?;
        offers.truncate(query.limit);
        Ok(offers)
    }
}
