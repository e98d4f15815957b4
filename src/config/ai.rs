// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";
pub const ENV_AI_CONFIG_PATH: &str = "AI_CONFIG_PATH";

fn default_max_tokens() -> u32 {
    2000
}
fn default_temperature() -> f32 {
    0.7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// "openai" | "claude" (case-insensitive)
    pub provider: String,
    /// "ENV" means: read from OPENAI_API_KEY / CLAUDE_API_KEY (by provider)
    #[serde(default)]
    pub api_key: String,
    /// Provider default when absent.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".to_string(),
            api_key: String::new(),
            model: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn from_json_str(data: &str) -> anyhow::Result<Self> {
        let mut cfg: AiConfig = serde_json::from_str(data)?;

        // Normalize provider
        cfg.provider = cfg.provider.trim().to_lowercase();

        // AI_ENABLED=0|1 overrides the file
        if let Ok(v) = env::var("AI_ENABLED") {
            cfg.enabled = matches!(v.trim(), "1" | "true" | "yes");
        }

        // Resolve api key if "ENV"; a missing variable only matters when enabled
        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            let resolved = match cfg.provider.as_str() {
                "openai" => env::var("OPENAI_API_KEY").ok(),
                "claude" | "anthropic" => env::var("CLAUDE_API_KEY")
                    .or_else(|_| env::var("ANTHROPIC_API_KEY"))
                    .ok(),
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
            cfg.api_key = match resolved {
                Some(k) => k,
                None if cfg.enabled => {
                    anyhow::bail!("Missing API key env var for provider {}", cfg.provider)
                }
                None => String::new(),
            };
        }

        if !cfg.temperature.is_finite() {
            cfg.temperature = default_temperature();
        }
        cfg.temperature = cfg.temperature.clamp(0.0, 2.0);
        if cfg.max_tokens == 0 {
            cfg.max_tokens = default_max_tokens();
        }

        Ok(cfg)
    }

    /// $AI_CONFIG_PATH, then `config/ai.json`. A missing file yields a disabled
    /// config; a broken one is an error.
    pub fn load_default() -> anyhow::Result<Self> {
        let path = env::var(ENV_AI_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_AI_CONFIG_PATH.into());
        if !Path::new(&path).exists() {
            return Ok(Self::default());
        }
        Self::load_from_file(&path)
    }
}
