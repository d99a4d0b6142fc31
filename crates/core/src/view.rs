// crates/core/src/view.rs
//! Client-side view models derived from backend responses.
//!
//! Nothing here is persisted: a [`ProcessStatus`] is rebuilt from every poll
//! response, and a [`CreditInfo`] is a snapshot taken once per source.

use context_pack_types::{CreditCheck, SourceDetail};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::status::{map_status, ProcessState};

/// Credit snapshot for a source that is waiting to be analyzed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "bindings/"))]
#[serde(rename_all = "camelCase")]
pub struct CreditInfo {
    pub source_id: String,
    pub total_chunks: u32,
    pub credits_required: u32,
    pub user_credits: u32,
    pub has_unlimited: bool,
    pub can_proceed: bool,
    pub credits_needed: u32,
}

impl CreditInfo {
    /// Build from the backend's credit check.
    ///
    /// `can_proceed` and `credits_needed` are recomputed from the balance so a
    /// backend that disagrees with its own numbers can't unlock a full run.
    pub fn from_check(check: &CreditCheck) -> Self {
        let can_proceed = check.has_unlimited || check.user_credits >= check.credits_required;
        if can_proceed != check.can_proceed {
            tracing::debug!(
                source_id = %check.source_id,
                backend = check.can_proceed,
                local = can_proceed,
                "credit check canProceed disagrees with balance"
            );
        }
        let credits_needed = if check.has_unlimited {
            0
        } else {
            check.credits_required.saturating_sub(check.user_credits)
        };
        Self {
            source_id: check.source_id.clone(),
            total_chunks: check.total_chunks,
            credits_required: check.credits_required,
            user_credits: check.user_credits,
            has_unlimited: check.has_unlimited,
            can_proceed,
            credits_needed,
        }
    }

    /// Largest partial run the balance covers, when a full run isn't possible.
    pub fn partial_chunks(&self) -> Option<u32> {
        if self.can_proceed || self.user_credits == 0 {
            return None;
        }
        let cap = if self.total_chunks > 0 {
            self.user_credits.min(self.total_chunks)
        } else {
            self.user_credits
        };
        Some(cap)
    }

    /// Actions the credit-check modal offers, in display order.
    pub fn actions(&self) -> Vec<CreditAction> {
        if self.can_proceed {
            return vec![CreditAction::StartFull];
        }
        let mut actions = Vec::with_capacity(2);
        if let Some(max_chunks) = self.partial_chunks() {
            actions.push(CreditAction::StartPartial { max_chunks });
        }
        actions.push(CreditAction::BuyCredits {
            credits_needed: self.credits_needed,
        });
        actions
    }
}

/// A choice offered by the credit-check modal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "bindings/"))]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CreditAction {
    StartFull,
    StartPartial { max_chunks: u32 },
    BuyCredits { credits_needed: u32 },
}

impl CreditAction {
    pub fn label(&self) -> String {
        match self {
            Self::StartFull => "Start analysis".to_string(),
            Self::StartPartial { max_chunks } => format!("Process {max_chunks} chunks"),
            Self::BuyCredits { credits_needed } => format!("Buy credits ({credits_needed} needed)"),
        }
    }
}

/// Per-source view model recomputed on every poll tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "bindings/"))]
#[serde(rename_all = "camelCase")]
pub struct ProcessStatus {
    pub state: ProcessState,
    /// Backend string the state was mapped from.
    pub raw_status: String,
    pub source_id: String,
    pub file_name: String,
    pub current_chunk: u32,
    pub total_chunks: u32,
    /// 0–100. Falls back to the chunk ratio when the backend sends none.
    pub progress: u8,
    /// The backend itself reported progress ≥ 100.
    #[serde(default)]
    pub progress_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Present only while `state` is `ReadyForAnalysis` and a snapshot exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits: Option<CreditInfo>,
}

impl ProcessStatus {
    pub fn from_source(source: &SourceDetail, credits: Option<&CreditInfo>) -> Self {
        let state = map_status(&source.status);
        let current_chunk = source.processed_chunks.unwrap_or(0);
        let total_chunks = source.total_chunks.unwrap_or(0);
        let credits = match state {
            ProcessState::ReadyForAnalysis => credits.cloned(),
            _ => None,
        };
        Self {
            state,
            raw_status: source.status.clone(),
            source_id: source.source_id.clone(),
            file_name: source
                .file_name
                .clone()
                .unwrap_or_else(|| source.source_id.clone()),
            current_chunk,
            total_chunks,
            progress: progress_percent(source.progress, current_chunk, total_chunks),
            progress_complete: reported_complete(source.progress),
            error_message: source.error_message.clone(),
            credits,
        }
    }

    /// Terminal state, or the backend reported ≥ 100%. A chunk ratio of
    /// 100% alone does not count: tree building follows the last chunk.
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal() || self.progress_complete
    }
}

/// Whether a backend-reported percent means the job is done.
pub fn reported_complete(reported: Option<f64>) -> bool {
    matches!(reported, Some(p) if p.is_finite() && p >= 100.0)
}

/// Backend percent when present, otherwise `round(current / total * 100)`.
pub fn progress_percent(reported: Option<f64>, current: u32, total: u32) -> u8 {
    let pct = match reported {
        Some(p) if p.is_finite() => p,
        _ if total > 0 => f64::from(current) / f64::from(total) * 100.0,
        _ => 0.0,
    };
    pct.round().clamp(0.0, 100.0) as u8
}
