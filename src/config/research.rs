// src/config/research.rs
//! Pipeline settings loaded from TOML.
//!
//! Lookup order:
//! 1) $RESEARCH_CONFIG_PATH (must exist if set)
//! 2) config/research.toml
//! 3) built-in defaults
//!
//! Env overrides applied after the file: `RESEARCH_CACHE_TTL_SECS`,
//! `LINKUP_API_KEY` (used when `linkup.api_key = "ENV"`).

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_RESEARCH_CONFIG_PATH: &str = "config/research.toml";
pub const ENV_RESEARCH_CONFIG_PATH: &str = "RESEARCH_CONFIG_PATH";
pub const ENV_CACHE_TTL_SECS: &str = "RESEARCH_CACHE_TTL_SECS";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub timeouts: TimeoutConfig,
    pub cache: CacheConfig,
    /// Offers returned when the caller does not ask for a specific count.
    pub default_max_offers: usize,
    /// Upper bound on `max_offers`.
    pub max_offers_limit: usize,
    /// Move reputable-network offers ahead of others after scoring (basic search only).
    pub quality_first: bool,
    /// Per-source fetch limit.
    pub source_limit: usize,
    pub linkup: LinkupConfig,
    /// JSON array of offer records loaded into the program store at startup.
    pub seed_programs_path: Option<PathBuf>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            cache: CacheConfig::default(),
            default_max_offers: 20,
            max_offers_limit: 100,
            quality_first: true,
            source_limit: 25,
            linkup: LinkupConfig::default(),
            seed_programs_path: Some(PathBuf::from("config/programs.json")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub outer_secs: u64,
    pub store_secs: u64,
    pub api_secs: u64,
    pub web_secs: u64,
    pub llm_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            outer_secs: 60,
            store_secs: 30,
            api_secs: 30,
            web_secs: 45,
            llm_secs: 45,
        }
    }
}

impl TimeoutConfig {
    pub fn outer(&self) -> Duration {
        Duration::from_secs(self.outer_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkupConfig {
    pub enabled: bool,
    pub base_url: String,
    /// "ENV" means: read LINKUP_API_KEY.
    pub api_key: String,
    /// Also use LinkUp as the web-search backend.
    pub use_for_web_search: bool,
}

impl Default for LinkupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.linkup.so/v1".to_string(),
            api_key: "ENV".to_string(),
            use_for_web_search: true,
        }
    }
}

impl ResearchConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: ResearchConfig = toml::from_str(s).context("parsing research config")?;
        cfg.apply_env();
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading research config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_RESEARCH_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("RESEARCH_CONFIG_PATH points to non-existent path"));
        }
        let default = PathBuf::from(DEFAULT_RESEARCH_CONFIG_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg.sanitize();
        Ok(cfg)
    }

    /// Resolved LinkUp key; `None` when disabled or not available.
    pub fn linkup_api_key(&self) -> Option<String> {
        if !self.linkup.enabled {
            return None;
        }
        let key = if self.linkup.api_key.trim().eq_ignore_ascii_case("env") {
            std::env::var("LINKUP_API_KEY").ok()?
        } else {
            self.linkup.api_key.clone()
        };
        let key = key.trim().to_string();
        (!key.is_empty()).then_some(key)
    }

    fn apply_env(&mut self) {
        if let Some(ttl) = std::env::var(ENV_CACHE_TTL_SECS)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            self.cache.ttl_secs = ttl;
        }
    }

    fn sanitize(&mut self) {
        let t = &mut self.timeouts;
        if t.outer_secs == 0 {
            t.outer_secs = TimeoutConfig::default().outer_secs;
        }
        for inner in [
            &mut t.store_secs,
            &mut t.api_secs,
            &mut t.web_secs,
            &mut t.llm_secs,
        ] {
            if *inner == 0 {
                *inner = 30;
            }
        }
        if self.max_offers_limit == 0 {
            self.max_offers_limit = 100;
        }
        self.default_max_offers = self.default_max_offers.clamp(1, self.max_offers_limit);
        if self.source_limit == 0 {
            self.source_limit = 25;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    #[serial_test::serial]
    #[test]
    fn partial_toml_keeps_defaults() {
        env::remove_var(ENV_CACHE_TTL_SECS);
        let cfg = ResearchConfig::from_toml_str(
            r#"
quality_first = false

[timeouts]
web_secs = 10
"#,
        )
        .unwrap();
        assert!(!cfg.quality_first);
        assert_eq!(cfg.timeouts.web_secs, 10);
        assert_eq!(cfg.timeouts.outer_secs, 60);
        assert_eq!(cfg.cache.ttl_secs, 3600);
        assert_eq!(cfg.default_max_offers, 20);
    }

    #[serial_test::serial]
    #[test]
    fn env_ttl_override_and_sanitize() {
        env::set_var(ENV_CACHE_TTL_SECS, "5");
        let cfg = ResearchConfig::from_toml_str(
            r#"
default_max_offers = 500
max_offers_limit = 50

[timeouts]
outer_secs = 0
"#,
        )
        .unwrap();
        assert_eq!(cfg.cache.ttl_secs, 5);
        assert_eq!(cfg.default_max_offers, 50);
        assert_eq!(cfg.timeouts.outer_secs, 60);
        env::remove_var(ENV_CACHE_TTL_SECS);
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_path_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_RESEARCH_CONFIG_PATH);
        env::remove_var(ENV_CACHE_TTL_SECS);

        // no files in the temp CWD → defaults
        let cfg = ResearchConfig::load_default().unwrap();
        assert_eq!(cfg.timeouts.llm_secs, 45);

        let p = tmp.path().join("custom.toml");
        fs::write(&p, "source_limit = 7\n").unwrap();
        env::set_var(ENV_RESEARCH_CONFIG_PATH, p.display().to_string());
        assert_eq!(ResearchConfig::load_default().unwrap().source_limit, 7);

        env::set_var(ENV_RESEARCH_CONFIG_PATH, tmp.path().join("missing.toml"));
        assert!(ResearchConfig::load_default().is_err());
        env::remove_var(ENV_RESEARCH_CONFIG_PATH);

        env::set_current_dir(&old).unwrap();
    }

    #[serial_test::serial]
    #[test]
    fn linkup_key_requires_enabled_and_value() {
        env::remove_var("LINKUP_API_KEY");
        let mut cfg = ResearchConfig::default();
        assert!(cfg.linkup_api_key().is_none());
        cfg.linkup.enabled = true;
        assert!(cfg.linkup_api_key().is_none());
        env::set_var("LINKUP_API_KEY", "lk-123");
        assert_eq!(cfg.linkup_api_key().as_deref(), Some("lk-123"));
        env::remove_var("LINKUP_API_KEY");
    }
}
