// crates/core/src/presentation.rs
//! What to show for a source, keyed by its mapped state.

use serde::Serialize;
use ts_rs::TS;

use crate::status::ProcessState;
use crate::view::ProcessStatus;

/// Jobs with at least this many chunks get a "check back later" view instead
/// of a live bar. Long jobs move slowly and a bar would suggest otherwise.
pub const LARGE_JOB_CHUNK_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "bindings/"))]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ProgressView {
    Extracting { file_name: String },
    AwaitingAnalysis { file_name: String, total_chunks: u32 },
    CheckBackLater { state: ProcessState, file_name: String, total_chunks: u32 },
    Bar { state: ProcessState, file_name: String, percent: u8, current_chunk: u32, total_chunks: u32 },
    Completed { file_name: String },
    Failed { file_name: String, message: String },
    Cancelled { file_name: String },
    Unknown { file_name: String, raw_status: String },
}

pub fn present(status: &ProcessStatus) -> ProgressView {
    let file_name = status.file_name.clone();
    match status.state {
        ProcessState::Extracting => ProgressView::Extracting { file_name },
        ProcessState::ReadyForAnalysis => ProgressView::AwaitingAnalysis {
            file_name,
            total_chunks: status.total_chunks,
        },
        ProcessState::Analyzing | ProcessState::BuildingTree
            if status.total_chunks >= LARGE_JOB_CHUNK_THRESHOLD =>
        {
            ProgressView::CheckBackLater {
                state: status.state,
                file_name,
                total_chunks: status.total_chunks,
            }
        }
        ProcessState::Analyzing | ProcessState::BuildingTree => ProgressView::Bar {
            state: status.state,
            file_name,
            percent: status.progress,
            current_chunk: status.current_chunk,
            total_chunks: status.total_chunks,
        },
        ProcessState::Completed => ProgressView::Completed { file_name },
        ProcessState::Failed => ProgressView::Failed {
            file_name,
            message: status
                .error_message
                .clone()
                .unwrap_or_else(|| "Processing failed".to_string()),
        },
        ProcessState::Cancelled => ProgressView::Cancelled { file_name },
        ProcessState::Unknown => ProgressView::Unknown {
            file_name,
            raw_status: status.raw_status.clone(),
        },
    }
}

fn phase(state: ProcessState) -> &'static str {
    match state {
        ProcessState::BuildingTree => "Building tree",
        _ => "Analyzing",
    }
}

impl std::fmt::Display for ProgressView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Extracting { file_name } => write!(f, "{file_name}: extracting conversations"),
            Self::AwaitingAnalysis { file_name, total_chunks } => {
                write!(f, "{file_name}: ready for analysis ({total_chunks} chunks)")
            }
            Self::CheckBackLater { state, file_name, total_chunks } => write!(
                f,
                "{file_name}: {} ({total_chunks} chunks). Large jobs take a while, check back later.",
                phase(*state)
            ),
            Self::Bar { state, file_name, percent, current_chunk, total_chunks } => write!(
                f,
                "{file_name}: {} {percent}% ({current_chunk}/{total_chunks})",
                phase(*state)
            ),
            Self::Completed { file_name } => write!(f, "{file_name}: complete"),
            Self::Failed { file_name, message } => write!(f, "{file_name}: failed: {message}"),
            Self::Cancelled { file_name } => write!(f, "{file_name}: cancelled"),
            Self::Unknown { file_name, raw_status } => {
                write!(f, "{file_name}: unknown status {raw_status:?}")
            }
        }
    }
}
