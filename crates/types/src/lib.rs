// crates/types/src/lib.rs
//! Wire types for the Context Pack backend API.
//!
//! These mirror the JSON the backend returns. They are deliberately loose
//! (most fields optional, unknown fields ignored): the backend owns the
//! schema and the client only reads it.

use serde::{Deserialize, Serialize};

/// One uploaded artifact moving through extract → analyze → build-tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDetail {
    pub source_id: String,
    /// Raw backend status, e.g. `"ready_for_analysis"` or `"analyzing_chunks"`.
    pub status: String,
    /// Backend-reported percent, 0–100 when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_chunks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SourceDetail {
    pub fn new(source_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            status: status.into(),
            progress: None,
            total_chunks: None,
            processed_chunks: None,
            file_name: None,
            error_message: None,
        }
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_chunks(mut self, processed: u32, total: u32) -> Self {
        self.processed_chunks = Some(processed);
        self.total_chunks = Some(total);
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// `GET /api/packs/{pack_id}` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackDetail {
    #[serde(default)]
    pub pack_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_name: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceDetail>,
}

impl PackDetail {
    pub fn source(&self, source_id: &str) -> Option<&SourceDetail> {
        self.sources.iter().find(|s| s.source_id == source_id)
    }
}

/// `GET /api/sources/{source_id}/credit-check` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditCheck {
    pub source_id: String,
    #[serde(default)]
    pub total_chunks: u32,
    #[serde(default)]
    pub credits_required: u32,
    #[serde(default)]
    pub user_credits: u32,
    #[serde(default)]
    pub has_unlimited: bool,
    #[serde(default)]
    pub can_proceed: bool,
    #[serde(default)]
    pub credits_needed: u32,
}

/// Body of `POST /api/sources/{source_id}/start-analysis`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartAnalysisRequest {
    /// Upper bound on chunks to analyze; `None` analyzes everything.
    pub max_chunks: Option<u32>,
}

/// Acknowledgement for a start-analysis call. Logged only: the next poll is
/// the source of truth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartAnalysisAck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Acknowledgement for a cancel call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CancelAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
