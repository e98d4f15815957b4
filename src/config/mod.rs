//! Runtime configuration: `config/ai.json` for the LLM layer and
//! `config/research.toml` for the pipeline.

pub mod ai;
pub mod research;

pub use ai::AiConfig;
pub use research::ResearchConfig;
