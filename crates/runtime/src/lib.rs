// crates/runtime/src/lib.rs
//! Async runtime for the job status reconciliation loop.
//!
//! Provides:
//! - `VisibilitySensor`: host visible/hidden flag
//! - `IntervalRunner`: fixed-period timer with a swappable callback
//! - `PollingController`: visibility-aware polling on top of the runner
//! - `Reconciler`: applies polls and user intents to the processing machine
//! - `WatchSession`: wires them together for one pack

pub mod config;
pub mod interval;
pub mod polling;
pub mod reconciler;
pub mod session;
pub mod visibility;

pub use config::PollingConfig;
pub use interval::IntervalRunner;
pub use polling::PollingController;
pub use reconciler::{ActionError, Reconciler, Snapshot};
pub use session::WatchSession;
pub use visibility::VisibilitySensor;
