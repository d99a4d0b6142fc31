// crates/core/src/status.rs
//! Backend status vocabulary → closed UI state.
//!
//! The backend reports status as free text and has grown several spellings
//! for the same phase ("processing", "analyzing_chunks", ...). All of the
//! loose matching lives in [`map_status`]; everything downstream works on
//! [`ProcessState`] only.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// UI-facing processing state of a single source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "bindings/"))]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Extracting,
    ReadyForAnalysis,
    Analyzing,
    BuildingTree,
    Completed,
    Failed,
    Cancelled,
    /// Backend string we don't recognise. Never aliased to a known state.
    Unknown,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extracting => "extracting",
            Self::ReadyForAnalysis => "ready_for_analysis",
            Self::Analyzing => "analyzing",
            Self::BuildingTree => "building_tree",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    /// No further backend progress is expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Work is running on the backend and a cancel call makes sense.
    pub fn is_cancelable(&self) -> bool {
        matches!(self, Self::Extracting | Self::Analyzing | Self::BuildingTree)
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a raw backend status onto a [`ProcessState`].
///
/// Case-insensitive (ASCII) and whitespace-trimmed. Rules are checked in
/// order, first match wins:
///
/// | substring | state |
/// |---|---|
/// | `cancel` | `Cancelled` |
/// | `fail`, `error` | `Failed` |
/// | `complete`, `built`, `done`, `finished` | `Completed` |
/// | `tree`, `building` | `BuildingTree` |
/// | `processing`, `analyzing` | `Analyzing` |
/// | `ready` | `ReadyForAnalysis` |
/// | `extract`, `upload`, `pending`, `queued` | `Extracting` |
///
/// Anything else is `Unknown`.
pub fn map_status(raw: &str) -> ProcessState {
    let s = raw.trim().to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| s.contains(n));

    if has(&["cancel"]) {
        ProcessState::Cancelled
    } else if has(&["fail", "error"]) {
        ProcessState::Failed
    } else if has(&["complete", "built", "done", "finished"]) {
        ProcessState::Completed
    } else if has(&["tree", "building"]) {
        ProcessState::BuildingTree
    } else if has(&["processing", "analyzing"]) {
        ProcessState::Analyzing
    } else if has(&["ready"]) {
        ProcessState::ReadyForAnalysis
    } else if has(&["extract", "upload", "pending", "queued"]) {
        ProcessState::Extracting
    } else {
        ProcessState::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_backend_statuses() {
        let cases = [
            ("extracting", ProcessState::Extracting),
            ("uploaded", ProcessState::Extracting),
            ("ready_for_analysis", ProcessState::ReadyForAnalysis),
            ("analyzing", ProcessState::Analyzing),
            ("analyzing_chunks", ProcessState::Analyzing),
            ("processing", ProcessState::Analyzing),
            ("building_tree", ProcessState::BuildingTree),
            ("tree_built", ProcessState::Completed),
            ("analysis_complete", ProcessState::Completed),
            ("completed", ProcessState::Completed),
            ("failed", ProcessState::Failed),
            ("processing_error", ProcessState::Failed),
            ("cancelled", ProcessState::Cancelled),
            ("canceled", ProcessState::Cancelled),
        ];
        for (raw, expected) in cases {
            assert_eq!(map_status(raw), expected, "raw status {raw:?}");
        }
    }

    #[test]
    fn test_case_and_whitespace_insensitive() {
        assert_eq!(map_status("  Analyzing_Chunks "), ProcessState::Analyzing);
        assert_eq!(map_status("READY_FOR_ANALYSIS"), ProcessState::ReadyForAnalysis);
        assert_eq!(map_status("Building_Tree"), ProcessState::BuildingTree);
    }

    #[test]
    fn test_unrecognised_status_is_unknown() {
        assert_eq!(map_status(""), ProcessState::Unknown);
        assert_eq!(map_status("mystery"), ProcessState::Unknown);
        assert_eq!(map_status("archived"), ProcessState::Unknown);
    }

    #[test]
    fn test_terminal_and_cancelable() {
        assert!(ProcessState::Completed.is_terminal());
        assert!(ProcessState::Cancelled.is_terminal());
        assert!(!ProcessState::Unknown.is_terminal());
        assert!(ProcessState::Analyzing.is_cancelable());
        assert!(!ProcessState::ReadyForAnalysis.is_cancelable());
        assert!(!ProcessState::Failed.is_cancelable());
    }

    #[test]
    fn test_serializes_snake_case() {
        let json = serde_json::to_string(&ProcessState::ReadyForAnalysis).unwrap();
        assert_eq!(json, "\"ready_for_analysis\"");
        assert_eq!(ProcessState::BuildingTree.to_string(), "building_tree");
    }

    proptest! {
        #[test]
        fn prop_map_status_is_total_and_deterministic(raw in ".*") {
            let first = map_status(&raw);
            prop_assert_eq!(first, map_status(&raw));
            prop_assert_eq!(first, map_status(&raw.to_ascii_uppercase()));
        }
    }
}
