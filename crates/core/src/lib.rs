// crates/core/src/lib.rs
pub mod error;
pub mod machine;
pub mod presentation;
pub mod status;
pub mod view;

pub use error::*;
pub use machine::{
    AnalysisChoice, MachineEffect, ModalState, ProcessingMachine, StartRequest,
    validate_choice,
};
pub use presentation::{present, ProgressView, LARGE_JOB_CHUNK_THRESHOLD};
pub use status::{map_status, ProcessState};
pub use view::{progress_percent, reported_complete, CreditAction, CreditInfo, ProcessStatus};
