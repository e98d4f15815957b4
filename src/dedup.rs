//! Deduplication by canonical network/brand key.
//!
//! - Offers whose name, network or link matches a known network collapse onto
//!   that network's tag (`amazon`, `shareasale`, `cj`, ...).
//! - Everything else is keyed by `lower(name)|lower(network)`.
//! - First occurrence wins, except that a later duplicate with a populated
//!   commission rate replaces a kept entry that has none (same position).
//!
//! No fuzzy matching: "Acme Inc" and "ACME, Inc." only merge when their
//! normalized forms are identical.

use std::collections::HashMap;

use crate::networks;
use crate::offer::OfferRecord;

#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    pub offers: Vec<OfferRecord>,
    pub removed: usize,
}

/// Dedup key for one offer.
pub fn dedup_key(offer: &OfferRecord) -> String {
    let by_name = networks::match_name(&offer.name);
    let by_network = || offer.network.as_deref().and_then(networks::match_name);
    let by_link = || offer.link().and_then(networks::match_link);

    if let Some(kn) = by_name.or_else(by_network).or_else(by_link) {
        return kn.tag.to_string();
    }

    format!(
        "{}|{}",
        networks::normalize(&offer.name),
        networks::normalize(offer.network.as_deref().unwrap_or_default())
    )
}

pub fn dedupe(offers: Vec<OfferRecord>) -> DedupOutcome {
    let total = offers.len();
    let mut kept: Vec<OfferRecord> = Vec::with_capacity(total);
    let mut index: HashMap<String, usize> = HashMap::with_capacity(total);

    for offer in offers {
        let key = dedup_key(&offer);
        match index.get(&key) {
            None => {
                index.insert(key, kept.len());
                kept.push(offer);
            }
            Some(&pos) => {
                if !kept[pos].has_commission() && offer.has_commission() {
                    kept[pos] = offer;
                }
            }
        }
    }

    DedupOutcome {
        removed: total - kept.len(),
        offers: kept,
    }
}
