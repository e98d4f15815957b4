//! Value types shared by the fetchers, the filter/dedup/scoring stages,
//! the store and the HTTP layer.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::classify::Category;

/// Which fetcher produced an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Store,
    AffiliateApi,
    WebSearch,
    LlmDiscovered,
}

/// Nothing in the pipeline confirms that a discovered program exists;
/// only curated store rows are marked verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    Verified,
    #[default]
    Unverified,
}

/// Commission as reported upstream: a bare percentage or free text
/// such as `"15-25%"`, `"8% per sale"` or `"$50 per signup"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommissionRate {
    Percent(f64),
    Text(String),
}

static RE_PERCENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*(?:-|–|to)?\s*(\d+(?:\.\d+)?)?\s*%").expect("percent regex")
});
static RE_FLAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\s*(\d+(?:,\d{3})*(?:\.\d+)?)").expect("flat amount regex"));

impl CommissionRate {
    /// Empty strings count as "no commission".
    pub fn is_populated(&self) -> bool {
        match self {
            CommissionRate::Percent(p) => p.is_finite() && *p > 0.0,
            CommissionRate::Text(s) => !s.trim().is_empty(),
        }
    }

    /// Highest percentage mentioned, e.g. 25.0 for `"15-25%"`.
    /// Fractions below 1.0 on the numeric form are read as ratios (0.15 → 15%).
    pub fn peak_percent(&self) -> Option<f64> {
        match self {
            CommissionRate::Percent(p) if p.is_finite() && *p > 0.0 => {
                Some(if *p < 1.0 { p * 100.0 } else { *p })
            }
            CommissionRate::Percent(_) => None,
            CommissionRate::Text(s) => RE_PERCENT
                .captures_iter(s)
                .filter_map(|c| {
                    let lo = c.get(1)?.as_str().parse::<f64>().ok()?;
                    let hi = c
                        .get(2)
                        .and_then(|m| m.as_str().parse::<f64>().ok())
                        .unwrap_or(lo);
                    Some(lo.max(hi))
                })
                .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v)))),
        }
    }

    /// Highest flat dollar amount mentioned, e.g. 50.0 for `"$50 per signup"`.
    pub fn flat_amount(&self) -> Option<f64> {
        match self {
            CommissionRate::Percent(_) => None,
            CommissionRate::Text(s) => RE_FLAT
                .captures_iter(s)
                .filter_map(|c| c.get(1)?.as_str().replace(',', "").parse::<f64>().ok())
                .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v)))),
        }
    }
}

/// Sub-scores in [0,1] attached during ranking.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OfferScores {
    pub research: f32,
    pub quality: f32,
    pub relevance: f32,
    pub personalization: f32,
    pub overall: f32,
}

/// One affiliate program candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commission_rate: Option<CommissionRate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default)]
    pub target_audience: Vec<String>,
    #[serde(default)]
    pub content_opportunities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_duration: Option<String>,
    /// Earnings per click, when the upstream reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epc: Option<f64>,
    pub source: Provenance,
    #[serde(default)]
    pub verification: Verification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<OfferScores>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub personalization_reasons: Vec<String>,
}

impl OfferRecord {
    /// Bare record with a fresh id; fetchers fill in the rest.
    pub fn new(name: impl Into<String>, source: Provenance) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            company: None,
            description: None,
            commission_rate: None,
            network: None,
            website: None,
            program_url: None,
            category: None,
            target_audience: Vec::new(),
            content_opportunities: Vec::new(),
            cookie_duration: None,
            epc: None,
            source,
            verification: Verification::Unverified,
            scores: None,
            personalization_reasons: Vec::new(),
        }
    }

    pub fn has_commission(&self) -> bool {
        self.commission_rate
            .as_ref()
            .is_some_and(CommissionRate::is_populated)
    }

    /// Program URL when present, otherwise the company website.
    pub fn link(&self) -> Option<&str> {
        self.program_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.website.as_deref().filter(|s| !s.trim().is_empty()))
    }

    pub fn overall_score(&self) -> f32 {
        self.scores.map(|s| s.overall).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    Completed,
}

/// Persisted outcome of one search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchRecord {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub search_term: String,
    #[serde(default)]
    pub niche: Option<String>,
    #[serde(default)]
    pub budget_range: Option<String>,
    pub category: Category,
    pub results: Vec<OfferRecord>,
    pub status: ResearchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-user ranking preferences. `learning_enabled` is stored but nothing
/// updates preferences automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub user_id: String,
    #[serde(default)]
    pub preferred_networks: Vec<String>,
    /// Ranges like `"10-20%"`, `"30%+"` or `"5%"`.
    #[serde(default)]
    pub preferred_commission_ranges: Vec<String>,
    #[serde(default)]
    pub preferred_categories: Vec<String>,
    #[serde(default)]
    pub preferred_difficulty_levels: Vec<String>,
    #[serde(default = "default_true")]
    pub learning_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl UserPreferences {
    pub fn defaults_for(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            preferred_networks: Vec::new(),
            preferred_commission_ranges: Vec::new(),
            preferred_categories: Vec::new(),
            preferred_difficulty_levels: Vec::new(),
            learning_enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.preferred_networks.is_empty()
            && self.preferred_commission_ranges.is_empty()
            && self.preferred_categories.is_empty()
    }
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferencesUpdate {
    pub preferred_networks: Option<Vec<String>>,
    pub preferred_commission_ranges: Option<Vec<String>>,
    pub preferred_categories: Option<Vec<String>>,
    pub preferred_difficulty_levels: Option<Vec<String>>,
    pub learning_enabled: Option<bool>,
}

impl PreferencesUpdate {
    pub fn apply(self, prefs: &mut UserPreferences) {
        if let Some(v) = self.preferred_networks {
            prefs.preferred_networks = clean_list(v);
        }
        if let Some(v) = self.preferred_commission_ranges {
            prefs.preferred_commission_ranges = clean_list(v);
        }
        if let Some(v) = self.preferred_categories {
            prefs.preferred_categories = clean_list(v);
        }
        if let Some(v) = self.preferred_difficulty_levels {
            prefs.preferred_difficulty_levels = clean_list(v);
        }
        if let Some(b) = self.learning_enabled {
            prefs.learning_enabled = b;
        }
        prefs.updated_at = Utc::now();
    }
}

/// Trim, drop empties, dedup case-insensitively while keeping first spelling.
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.to_ascii_lowercase()))
        .collect()
}
