use thiserror::Error;

/// Errors raised by user actions against the processing state machine.
///
/// These are rejected intents (nothing was sent to the backend), not backend
/// failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error("No credit check is open")]
    NoCreditCheck,

    #[error("Not enough credits: {required} required, {available} available")]
    InsufficientCredits { required: u32, available: u32 },

    #[error("Chunk limit {requested} is out of range (1..={max})")]
    InvalidChunkLimit { requested: u32, max: u32 },

    #[error("No source is in a cancelable state")]
    NothingToCancel,
}
