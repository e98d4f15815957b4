//! Fake/placeholder program filter.
//!
//! Two independent passes over each offer:
//! - **denylist**: the name contains a generic marketing-sounding phrase
//!   ("solutions", "marketplace", "pro program", ...). Offers whose link points
//!   at a known affiliate network domain are exempt.
//! - **echo**: the name contains the search term verbatim, i.e. the model
//!   probably echoed the query back as a company name.
//!
//! Precision over recall: some genuine niche programs get discarded.

use serde::Serialize;

use crate::networks;
use crate::offer::OfferRecord;

pub const DEFAULT_DENYLIST: &[&str] = &[
    "solutions",
    "marketplace",
    "pro program",
    "premium program",
    "partner network hub",
    "affiliate hub",
    "global network",
    "enterprises",
    "placeholder",
    "example",
    "sample program",
    "lorem ipsum",
    "your company",
    "company name",
    "generic",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    EmptyName,
    Denylisted,
    EchoesSearchTerm,
}

#[derive(Debug, Clone, Serialize)]
pub struct Rejected {
    pub name: String,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub kept: Vec<OfferRecord>,
    pub rejected: Vec<Rejected>,
}

#[derive(Debug, Clone)]
pub struct QualityFilter {
    denylist: Vec<String>,
    /// When set, a single-word term only rejects a name equal to it.
    exact_single_word: bool,
}

impl Default for QualityFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect())
    }
}

impl QualityFilter {
    pub fn new(denylist: Vec<String>) -> Self {
        Self {
            denylist: denylist
                .into_iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            exact_single_word: false,
        }
    }

    /// Softer echo rule: "yoga" rejects "Yoga" but keeps "Alo Yoga".
    pub fn exact_single_word_terms(mut self, on: bool) -> Self {
        self.exact_single_word = on;
        self
    }

    /// Run both passes against every search term; input order is preserved.
    pub fn filter(&self, offers: Vec<OfferRecord>, search_terms: &[&str]) -> FilterOutcome {
        let terms: Vec<String> = search_terms
            .iter()
            .map(|t| networks::normalize(t))
            .filter(|t| !t.is_empty())
            .collect();

        let mut out = FilterOutcome::default();
        for offer in offers {
            match self.check(&offer, &terms) {
                None => out.kept.push(offer),
                Some(reason) => out.rejected.push(Rejected {
                    name: offer.name,
                    reason,
                }),
            }
        }
        out
    }

    fn check(&self, offer: &OfferRecord, terms: &[String]) -> Option<RejectReason> {
        let name = networks::normalize(&offer.name);
        if name.is_empty() {
            return Some(RejectReason::EmptyName);
        }

        for term in terms {
            if echoes(&name, term, self.exact_single_word) {
                return Some(RejectReason::EchoesSearchTerm);
            }
        }

        let denylisted = self.denylist.iter().any(|d| name.contains(d.as_str()));
        if denylisted {
            let allowlisted = [offer.program_url.as_deref(), offer.website.as_deref()]
                .into_iter()
                .flatten()
                .any(networks::is_allowlisted_link);
            if !allowlisted {
                return Some(RejectReason::Denylisted);
            }
        }
        None
    }
}

fn echoes(name: &str, term: &str, exact_single_word: bool) -> bool {
    if exact_single_word && !term.contains(' ') {
        return name == term;
    }
    name.contains(term)
}
