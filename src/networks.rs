//! # Known Networks
//!
//! A fixed registry of well-known affiliate networks and brand programs.
//! One table drives several heuristics:
//!
//! - dedup keys (every offer mentioning "ShareASale" collapses to `shareasale`),
//! - the fake-program filter's domain allowlist,
//! - the known-network bonus in quality scoring,
//! - the canned web-search query templates,
//! - the quality-first ordering pass, which only promotes non-marketplace
//!   entries.
//!
//! Matching is case-insensitive on whole words for names and on registrable
//! domain suffix for links.

use url::Url;

#[derive(Debug, Clone, Copy)]
pub struct KnownNetwork {
    /// Canonical tag used as the dedup key.
    pub tag: &'static str,
    pub display: &'static str,
    /// Lower-case phrases matched on word boundaries against names/networks.
    pub patterns: &'static [&'static str],
    /// Domains whose hosts (or subdomains) belong to this network.
    pub domains: &'static [&'static str],
    /// Whether the web-search fetcher issues queries against this domain.
    pub searchable: bool,
    /// Retail marketplace whose links are usually raw product listings.
    pub marketplace: bool,
}

pub const KNOWN_NETWORKS: &[KnownNetwork] = &[
    KnownNetwork {
        tag: "amazon",
        display: "Amazon Associates",
        patterns: &["amazon associates", "amazon affiliate", "amazon"],
        domains: &["amazon.com", "affiliate-program.amazon.com", "amzn.to"],
        searchable: false,
        marketplace: true,
    },
    KnownNetwork {
        tag: "shareasale",
        display: "ShareASale",
        patterns: &["shareasale", "share a sale"],
        domains: &["shareasale.com"],
        searchable: true,
        marketplace: false,
    },
    KnownNetwork {
        tag: "cj",
        display: "CJ Affiliate",
        patterns: &["cj affiliate", "commission junction", "cj.com"],
        domains: &["cj.com"],
        searchable: true,
        marketplace: false,
    },
    KnownNetwork {
        tag: "impact",
        display: "Impact",
        patterns: &["impact.com", "impact radius", "impact"],
        domains: &["impact.com"],
        searchable: true,
        marketplace: false,
    },
    KnownNetwork {
        tag: "rakuten",
        display: "Rakuten Advertising",
        patterns: &["rakuten advertising", "rakuten linkshare", "rakuten"],
        domains: &["rakutenadvertising.com", "rakuten.com"],
        searchable: true,
        marketplace: false,
    },
    KnownNetwork {
        tag: "awin",
        display: "Awin",
        patterns: &["awin"],
        domains: &["awin.com"],
        searchable: true,
        marketplace: false,
    },
    KnownNetwork {
        tag: "clickbank",
        display: "ClickBank",
        patterns: &["clickbank"],
        domains: &["clickbank.com"],
        searchable: true,
        marketplace: false,
    },
    KnownNetwork {
        tag: "partnerstack",
        display: "PartnerStack",
        patterns: &["partnerstack"],
        domains: &["partnerstack.com"],
        searchable: true,
        marketplace: false,
    },
    KnownNetwork {
        tag: "flexoffers",
        display: "FlexOffers",
        patterns: &["flexoffers"],
        domains: &["flexoffers.com"],
        searchable: false,
        marketplace: false,
    },
    KnownNetwork {
        tag: "avantlink",
        display: "AvantLink",
        patterns: &["avantlink"],
        domains: &["avantlink.com"],
        searchable: false,
        marketplace: false,
    },
    KnownNetwork {
        tag: "ebay",
        display: "eBay Partner Network",
        patterns: &["ebay partner network", "ebay"],
        domains: &["ebay.com", "partnernetwork.ebay.com"],
        searchable: false,
        marketplace: true,
    },
    KnownNetwork {
        tag: "walmart",
        display: "Walmart Affiliates",
        patterns: &["walmart"],
        domains: &["walmart.com"],
        searchable: false,
        marketplace: true,
    },
    KnownNetwork {
        tag: "target",
        display: "Target Partners",
        patterns: &["target partners", "target affiliate"],
        domains: &["target.com"],
        searchable: false,
        marketplace: true,
    },
    KnownNetwork {
        tag: "etsy",
        display: "Etsy Affiliates",
        patterns: &["etsy"],
        domains: &["etsy.com"],
        searchable: false,
        marketplace: true,
    },
    KnownNetwork {
        tag: "shopify",
        display: "Shopify Affiliate Program",
        patterns: &["shopify"],
        domains: &["shopify.com"],
        searchable: false,
        marketplace: true,
    },
];

/// Lowercase, turn separators into spaces, collapse whitespace.
pub fn normalize(s: &str) -> String {
    let mut out = s.trim().to_lowercase();
    for ch in ['—', '–', '-', '_', '/', '\\', ',', '(', ')', '|', ':', '!', '\''] {
        out = out.replace(ch, " ");
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Word-boundary phrase match on already-normalized text.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let padded = format!(" {haystack} ");
    padded.contains(&format!(" {phrase} "))
}

/// Lower-case host without a leading `www.`; `None` for unparsable or host-less URLs.
pub fn host_of(link: &str) -> Option<String> {
    let trimmed = link.trim();
    let parsed = Url::parse(trimmed)
        .or_else(|_| Url::parse(&format!("https://{trimmed}")))
        .ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Network whose patterns appear in `text` (a name or network field).
pub fn match_name(text: &str) -> Option<&'static KnownNetwork> {
    let n = normalize(text);
    if n.is_empty() {
        return None;
    }
    KNOWN_NETWORKS
        .iter()
        .find(|kn| kn.patterns.iter().any(|p| contains_phrase(&n, p)))
}

/// Network owning the host of `link`.
pub fn match_link(link: &str) -> Option<&'static KnownNetwork> {
    let host = host_of(link)?;
    KNOWN_NETWORKS
        .iter()
        .find(|kn| kn.domains.iter().any(|d| host_matches(&host, d)))
}

/// Whether `link` points at a domain in the known-network allowlist.
pub fn is_allowlisted_link(link: &str) -> bool {
    match_link(link).is_some()
}

/// Resolve a display name from a free-form network label, if known.
pub fn canonical_display(network: &str) -> Option<&'static str> {
    match_name(network).map(|kn| kn.display)
}

/// Known network that is not a retail marketplace.
pub fn is_reputable(kn: &KnownNetwork) -> bool {
    !kn.marketplace
}

pub fn searchable() -> impl Iterator<Item = &'static KnownNetwork> {
    KNOWN_NETWORKS.iter().filter(|kn| kn.searchable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_match_is_case_insensitive_and_word_bounded() {
        assert_eq!(match_name("CJ Affiliate").map(|k| k.tag), Some("cj"));
        assert_eq!(match_name("SHAREASALE").map(|k| k.tag), Some("shareasale"));
        assert_eq!(match_name("Impact Radius").map(|k| k.tag), Some("impact"));
        // "impactful" is not the Impact network
        assert!(match_name("Impactful Yoga Studio").is_none());
        assert!(match_name("").is_none());
    }

    #[test]
    fn link_match_uses_domain_suffix() {
        assert_eq!(
            match_link("https://affiliate-program.amazon.com/welcome").map(|k| k.tag),
            Some("amazon")
        );
        assert_eq!(
            match_link("www.shareasale.com/shareasale.cfm?merchantID=1").map(|k| k.tag),
            Some("shareasale")
        );
        assert!(match_link("https://notamazon.com").is_none());
        assert!(match_link("not a url at all").is_none());
    }

    #[test]
    fn marketplaces_are_not_reputable() {
        let reputable: Vec<&str> = KNOWN_NETWORKS
            .iter()
            .filter(|k| is_reputable(k))
            .map(|k| k.tag)
            .collect();
        for t in ["amazon", "ebay", "walmart", "etsy", "target", "shopify"] {
            assert!(!reputable.contains(&t), "{t} should be a marketplace");
        }
        for t in ["cj", "shareasale", "impact", "awin", "avantlink"] {
            assert!(reputable.contains(&t), "{t} should be reputable");
        }
    }

    #[test]
    fn host_strips_www() {
        assert_eq!(host_of("https://www.REI.com/x").as_deref(), Some("rei.com"));
    }

    #[test]
    fn normalize_collapses_separators() {
        assert_eq!(normalize("  Wall—Street / Journal "), "wall street journal");
    }
}
