//! Offer scoring and ranking.
//!
//! Four sub-scores in [0,1]:
//! - `research`        : provenance + field completeness + verification
//! - `quality`         : commission magnitude + description length + known network + URL shape
//! - `relevance`       : search-term presence in name/description/company + audience overlap
//! - `personalization` : overlap with the user's network/commission/category preferences
//!
//! Overall = 0.30·research + 0.25·quality + 0.25·relevance + 0.20·personalization.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::networks::{self, KnownNetwork};
use crate::offer::{OfferRecord, OfferScores, Provenance, UserPreferences, Verification};

pub const W_RESEARCH: f32 = 0.30;
pub const W_QUALITY: f32 = 0.25;
pub const W_RELEVANCE: f32 = 0.25;
pub const W_PERSONALIZATION: f32 = 0.20;

/// Personalization score when there is nothing to compare against.
pub const NEUTRAL_PERSONALIZATION: f32 = 0.5;

fn clamp01(x: f32) -> f32 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn provenance_weight(p: Provenance) -> f32 {
    match p {
        Provenance::LlmDiscovered => 0.9,
        Provenance::AffiliateApi => 0.8,
        Provenance::Store => 0.7,
        Provenance::WebSearch => 0.5,
    }
}

fn filled(s: &Option<String>) -> bool {
    s.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Share of descriptive fields that are populated.
pub fn completeness(o: &OfferRecord) -> f32 {
    let checks = [
        filled(&o.description),
        o.has_commission(),
        filled(&o.network),
        o.link().is_some(),
        o.category.is_some(),
        !o.target_audience.is_empty(),
        !o.content_opportunities.is_empty(),
    ];
    checks.iter().filter(|b| **b).count() as f32 / checks.len() as f32
}

pub fn research_score(o: &OfferRecord) -> f32 {
    let verified = if o.verification == Verification::Verified {
        1.0
    } else {
        0.0
    };
    clamp01(0.5 * provenance_weight(o.source) + 0.4 * completeness(o) + 0.1 * verified)
}

fn commission_bucket(o: &OfferRecord) -> f32 {
    let Some(rate) = o.commission_rate.as_ref().filter(|r| r.is_populated()) else {
        return 0.0;
    };
    if let Some(p) = rate.peak_percent() {
        return match p {
            p if p >= 30.0 => 0.4,
            p if p >= 15.0 => 0.3,
            p if p >= 5.0 => 0.2,
            _ => 0.1,
        };
    }
    match rate.flat_amount() {
        Some(a) if a >= 100.0 => 0.4,
        Some(a) if a >= 25.0 => 0.3,
        Some(_) => 0.2,
        None => 0.1,
    }
}

fn description_bucket(o: &OfferRecord) -> f32 {
    let len = o
        .description
        .as_deref()
        .map(|d| d.trim().chars().count())
        .unwrap_or(0);
    match len {
        0 => 0.0,
        l if l >= 200 => 0.2,
        l if l >= 80 => 0.15,
        _ => 0.05,
    }
}

pub fn is_known_network(o: &OfferRecord) -> bool {
    known_network(o).is_some()
}

/// Network the offer runs on: network field, then name, then link host.
pub fn known_network(o: &OfferRecord) -> Option<&'static KnownNetwork> {
    o.network
        .as_deref()
        .and_then(networks::match_name)
        .or_else(|| networks::match_name(&o.name))
        .or_else(|| o.link().and_then(networks::match_link))
}

/// On a known network that is not a retail marketplace.
pub fn is_reputable_network(o: &OfferRecord) -> bool {
    known_network(o).is_some_and(networks::is_reputable)
}

/// http(s) URL with a dotted host.
pub fn is_well_formed_url(link: &str) -> bool {
    match Url::parse(link.trim()) {
        Ok(u) => {
            matches!(u.scheme(), "http" | "https")
                && u.host_str().is_some_and(|h| h.contains('.'))
        }
        Err(_) => false,
    }
}

pub fn quality_score(o: &OfferRecord) -> f32 {
    let network = if is_known_network(o) { 0.2 } else { 0.0 };
    let url = if o.link().is_some_and(is_well_formed_url) {
        0.2
    } else {
        0.0
    };
    clamp01(commission_bucket(o) + description_bucket(o) + network + url)
}

pub fn relevance_score(o: &OfferRecord, search_terms: &[&str]) -> f32 {
    let terms: Vec<String> = search_terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    if terms.is_empty() {
        return 0.0;
    }

    let name = o.name.to_lowercase();
    let desc = o.description.as_deref().unwrap_or_default().to_lowercase();
    let company = o.company.as_deref().unwrap_or_default().to_lowercase();
    let audience: Vec<String> = o.target_audience.iter().map(|a| a.to_lowercase()).collect();

    let mut text_sum = 0.0f32;
    let mut audience_hits = 0usize;
    for t in &terms {
        let mut per_term = 0.0f32;
        if name.contains(t.as_str()) {
            per_term += 0.5;
        }
        if desc.contains(t.as_str()) {
            per_term += 0.3;
        }
        if company.contains(t.as_str()) {
            per_term += 0.2;
        }
        text_sum += per_term.min(1.0);

        let words: Vec<&str> = t.split_whitespace().filter(|w| w.len() > 2).collect();
        let overlaps = audience
            .iter()
            .any(|a| a.contains(t.as_str()) || words.iter().any(|w| a.contains(w)));
        if overlaps {
            audience_hits += 1;
        }
    }

    let n = terms.len() as f32;
    clamp01(0.8 * (text_sum / n) + 0.2 * (audience_hits as f32 / n))
}

static RE_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*%?\s*(?:(?:-|–|to)\s*(\d+(?:\.\d+)?)|(\+))?")
        .expect("commission range regex")
});

/// Parse `"10-20%"` → (10, 20), `"30%+"` → (30, ∞), `"5%"` → (5, 5).
pub fn parse_commission_range(s: &str) -> Option<(f64, f64)> {
    let caps = RE_RANGE.captures(s)?;
    let lo = caps.get(1)?.as_str().parse::<f64>().ok()?;
    if let Some(hi) = caps.get(2).and_then(|m| m.as_str().parse::<f64>().ok()) {
        return Some((lo.min(hi), lo.max(hi)));
    }
    if caps.get(3).is_some() || s.contains('+') {
        return Some((lo, f64::INFINITY));
    }
    Some((lo, lo))
}

/// Personalization score plus the reasons behind it.
pub fn personalization(o: &OfferRecord, prefs: Option<&UserPreferences>) -> (f32, Vec<String>) {
    let Some(prefs) = prefs.filter(|p| !p.is_empty()) else {
        return (NEUTRAL_PERSONALIZATION, Vec::new());
    };

    let mut score = 0.0f32;
    let mut reasons = Vec::new();

    if let Some(network) = o.network.as_deref() {
        let offer_net = networks::normalize(network);
        let offer_tag = networks::match_name(network).map(|k| k.tag);
        let hit = prefs.preferred_networks.iter().find(|p| {
            let pn = networks::normalize(p);
            pn == offer_net || (offer_tag.is_some() && networks::match_name(p).map(|k| k.tag) == offer_tag)
        });
        if let Some(p) = hit {
            score += 0.4;
            reasons.push(format!("Uses your preferred network {p}"));
        }
    }

    if let Some(peak) = o.commission_rate.as_ref().and_then(|c| c.peak_percent()) {
        let hit = prefs.preferred_commission_ranges.iter().find(|r| {
            parse_commission_range(r).is_some_and(|(lo, hi)| peak >= lo && peak <= hi)
        });
        if let Some(r) = hit {
            score += 0.3;
            reasons.push(format!("Commission up to {peak}% fits your {r} range"));
        }
    }

    if let Some(cat) = o.category {
        let hit = prefs.preferred_categories.iter().find(|c| {
            crate::classify::Category::parse(c) == Some(cat)
        });
        if let Some(c) = hit {
            score += 0.3;
            reasons.push(format!("Matches your preferred category {c}"));
        }
    }

    (clamp01(score), reasons)
}

pub fn overall(research: f32, quality: f32, relevance: f32, personalization: f32) -> f32 {
    clamp01(
        W_RESEARCH * clamp01(research)
            + W_QUALITY * clamp01(quality)
            + W_RELEVANCE * clamp01(relevance)
            + W_PERSONALIZATION * clamp01(personalization),
    )
}

/// Attach scores and personalization reasons to an offer.
pub fn score(
    mut offer: OfferRecord,
    search_terms: &[&str],
    prefs: Option<&UserPreferences>,
) -> OfferRecord {
    let research = research_score(&offer);
    let quality = quality_score(&offer);
    let relevance = relevance_score(&offer, search_terms);
    let (personal, reasons) = personalization(&offer, prefs);
    offer.scores = Some(OfferScores {
        research,
        quality,
        relevance,
        personalization: personal,
        overall: overall(research, quality, relevance, personal),
    });
    offer.personalization_reasons = reasons;
    offer
}

/// Stable sort by overall score (desc), then keep the top `max_offers`.
pub fn rank(mut offers: Vec<OfferRecord>, max_offers: usize) -> Vec<OfferRecord> {
    offers.sort_by(|a, b| b.overall_score().total_cmp(&a.overall_score()));
    offers.truncate(max_offers);
    offers
}

/// Stable partition: offers on a reputable network first; unaffiliated
/// entries and marketplace listings after. Returns whether the resulting
/// order still agrees with the scores.
pub fn prioritize_known_networks(offers: Vec<OfferRecord>) -> (Vec<OfferRecord>, bool) {
    let (mut known, rest): (Vec<_>, Vec<_>) = offers.into_iter().partition(is_reputable_network);
    known.extend(rest);
    let consistent = is_score_ordered(&known);
    (known, consistent)
}

/// True when no offer is preceded by one with a strictly lower overall score.
pub fn is_score_ordered(offers: &[OfferRecord]) -> bool {
    offers
        .windows(2)
        .all(|w| w[0].overall_score() >= w[1].overall_score())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Category;
    use crate::offer::CommissionRate;

    fn rich_offer() -> OfferRecord {
        let mut o = OfferRecord::new("Coursera Affiliate Program", Provenance::AffiliateApi);
        o.description = Some("Online courses from top universities, including quantum computing and machine learning specializations.".into());
        o.commission_rate = Some(CommissionRate::Text("15-25%".into()));
        o.network = Some("CJ Affiliate".into());
        o.program_url = Some("https://www.coursera.org/affiliates".into());
        o.category = Some(Category::Education);
        o.target_audience = vec!["students".into(), "career changers".into()];
        o.content_opportunities = vec!["course reviews".into()];
        o
    }

    #[test]
    fn overall_stays_in_unit_interval() {
        assert_eq!(overall(2.0, 2.0, 2.0, 2.0), 1.0);
        assert_eq!(overall(-1.0, -1.0, -1.0, -1.0), 0.0);
        assert_eq!(overall(f32::NAN, 0.0, 0.0, 0.0), 0.0);
        let o = score(rich_offer(), &["quantum computing", "courses"], None);
        let s = o.scores.unwrap();
        for v in [s.research, s.quality, s.relevance, s.personalization, s.overall] {
            assert!((0.0..=1.0).contains(&v), "score out of range: {v}");
        }
    }

    #[test]
    fn complete_offer_beats_bare_offer() {
        let rich = score(rich_offer(), &["courses"], None);
        let bare = score(
            OfferRecord::new("Some Site", Provenance::WebSearch),
            &["courses"],
            None,
        );
        assert!(rich.overall_score() > bare.overall_score());
        assert!((completeness(&rich_offer()) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn quality_buckets() {
        let o = rich_offer();
        // 0.3 commission + 0.15 description + 0.2 network + 0.2 url
        assert!((quality_score(&o) - 0.85).abs() < 1e-6);
    }

    #[test]
    fn relevance_counts_name_and_description() {
        let o = rich_offer();
        let r = relevance_score(&o, &["quantum computing"]);
        // description only → 0.8 * 0.3
        assert!((r - 0.24).abs() < 1e-6, "got {r}");
        assert_eq!(relevance_score(&o, &[]), 0.0);
    }

    #[test]
    fn personalization_neutral_without_prefs() {
        let (s, reasons) = personalization(&rich_offer(), None);
        assert_eq!(s, NEUTRAL_PERSONALIZATION);
        assert!(reasons.is_empty());
    }

    #[test]
    fn personalization_matches_network_range_category() {
        let mut p = UserPreferences::defaults_for("u");
        p.preferred_networks = vec!["Commission Junction".into()];
        p.preferred_commission_ranges = vec!["20-30%".into()];
        p.preferred_categories = vec!["Education".into()];
        let (s, reasons) = personalization(&rich_offer(), Some(&p));
        assert!((s - 1.0).abs() < 1e-6);
        assert_eq!(reasons.len(), 3);
    }

    #[test]
    fn commission_range_parsing() {
        assert_eq!(parse_commission_range("10-20%"), Some((10.0, 20.0)));
        assert_eq!(parse_commission_range("30%+"), Some((30.0, f64::INFINITY)));
        assert_eq!(parse_commission_range("5%"), Some((5.0, 5.0)));
        assert_eq!(parse_commission_range("high"), None);
    }

    #[test]
    fn rank_is_stable_and_truncates() {
        let mut offers = Vec::new();
        for (i, s) in [0.5f32, 0.9, 0.5, 0.1].iter().enumerate() {
            let mut o = OfferRecord::new(format!("o{i}"), Provenance::Store);
            o.scores = Some(OfferScores {
                overall: *s,
                ..Default::default()
            });
            offers.push(o);
        }
        let ranked = rank(offers, 3);
        let names: Vec<_> = ranked.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["o1", "o0", "o2"]);
        assert!(is_score_ordered(&ranked));
    }

    #[test]
    fn known_network_pass_flags_inversion() {
        let mut generic = OfferRecord::new("Tentsile", Provenance::Store);
        generic.scores = Some(OfferScores {
            overall: 0.9,
            ..Default::default()
        });
        let mut known = OfferRecord::new("Backcountry", Provenance::Store);
        known.network = Some("AvantLink".into());
        known.scores = Some(OfferScores {
            overall: 0.4,
            ..Default::default()
        });
        let (ordered, consistent) = prioritize_known_networks(vec![generic, known]);
        assert_eq!(ordered[0].name, "Backcountry");
        assert!(!consistent);
    }

    #[test]
    fn marketplace_listing_is_not_promoted() {
        let mut direct = OfferRecord::new("Tentsile", Provenance::Store);
        direct.scores = Some(OfferScores {
            overall: 0.58,
            ..Default::default()
        });
        let mut listing = OfferRecord::new("Tree Tent 3-Person", Provenance::WebSearch);
        listing.network = Some("Amazon".into());
        listing.scores = Some(OfferScores {
            overall: 0.34,
            ..Default::default()
        });
        assert!(is_known_network(&listing));
        assert!(!is_reputable_network(&listing));
        let (ordered, consistent) = prioritize_known_networks(vec![direct, listing]);
        assert_eq!(ordered[0].name, "Tentsile");
        assert!(consistent);
    }
}
