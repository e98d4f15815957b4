//! Error kinds for the research pipeline and its collaborators.
//!
//! Sources, the LLM layer and the store each have their own enum so callers can
//! tell "no offers exist" apart from "every data source failed".

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::sources::SourceReport;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM client is disabled")]
    Disabled,

    #[error("missing API key for provider {provider}")]
    MissingApiKey { provider: &'static str },

    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM provider returned status {status}")]
    Status { status: u16 },

    #[error("LLM returned an empty completion")]
    EmptyResponse,
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("source timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("source is not configured")]
    NotConfigured,

    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {status}")]
    Status { status: u16 },

    #[error("upstream payload could not be parsed: {0}")]
    Malformed(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("record not found: {what}")]
    NotFound { what: String },

    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("every offer source failed")]
    AllSourcesFailed { reports: Vec<SourceReport> },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ResearchError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ResearchError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ResearchError::AllSourcesFailed { .. } => StatusCode::BAD_GATEWAY,
            ResearchError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ResearchError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ResearchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = json!({
            "success": false,
            "message": self.to_string(),
        });
        if let ResearchError::AllSourcesFailed { reports } = &self {
            body["sources"] = serde_json::to_value(reports).unwrap_or_default();
        }
        if status.is_server_error() {
            tracing::error!(target: "research", error = %self, "request failed");
        }
        (status, Json(body)).into_response()
    }
}
