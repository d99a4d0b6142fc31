// crates/runtime/src/reconciler.rs
//! Reconciler: one owner for the processing machine and the latest poll.
//!
//! Every poll response and every user intent goes through here. The
//! machine lives behind an async mutex that is never held across a backend
//! call. Observers read [`Snapshot`]s from a watch channel that only
//! notifies when something visible changed.

use std::sync::Arc;
use std::time::Duration;

use context_pack_client::{ClientError, PackBackend};
use context_pack_core::{
    AnalysisChoice, MachineEffect, MachineError, ModalState, ProcessStatus, ProcessingMachine,
    StartRequest,
};
use context_pack_types::PackDetail;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Mutex};

use crate::config::PollingConfig;

/// What observers see after each reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub pack_id: String,
    pub statuses: Vec<ProcessStatus>,
    pub modal: ModalState,
    /// True until every source is finished. Drives whether polling runs.
    pub outstanding: bool,
    /// RFC 3339 time of the last successful poll.
    pub polled_at: Option<String>,
}

impl Snapshot {
    fn initial(pack_id: &str) -> Self {
        Self {
            pack_id: pack_id.to_string(),
            statuses: Vec::new(),
            modal: ModalState::Hidden,
            outstanding: true,
            polled_at: None,
        }
    }

    fn same_content(&self, other: &Snapshot) -> bool {
        self.statuses == other.statuses
            && self.modal == other.modal
            && self.outstanding == other.outstanding
    }

    pub fn status(&self, source_id: &str) -> Option<&ProcessStatus> {
        self.statuses.iter().find(|s| s.source_id == source_id)
    }
}

/// Failure of a user-initiated action.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Rejected(#[from] MachineError),

    #[error("Backend request failed: {0}")]
    Backend(#[from] ClientError),

    #[error("Failed to load result: {0}")]
    LoadResult(#[source] ClientError),
}

#[derive(Default)]
struct State {
    machine: ProcessingMachine,
    pack: Option<PackDetail>,
    polled_at: Option<String>,
}

pub struct Reconciler {
    backend: Arc<dyn PackBackend>,
    pack_id: String,
    cancel_grace: Duration,
    state: Mutex<State>,
    snapshot_tx: watch::Sender<Snapshot>,
    outstanding_tx: watch::Sender<bool>,
}

impl Reconciler {
    pub fn new(backend: Arc<dyn PackBackend>, pack_id: impl Into<String>, config: &PollingConfig) -> Self {
        let pack_id = pack_id.into();
        let (snapshot_tx, _) = watch::channel(Snapshot::initial(&pack_id));
        let (outstanding_tx, _) = watch::channel(true);
        Self {
            backend,
            pack_id,
            cancel_grace: config.cancel_grace,
            state: Mutex::new(State::default()),
            snapshot_tx,
            outstanding_tx,
        }
    }

    pub fn pack_id(&self) -> &str {
        &self.pack_id
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn outstanding(&self) -> watch::Receiver<bool> {
        self.outstanding_tx.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Fetch the pack once and reconcile. Failures are logged and dropped;
    /// the next tick retries.
    pub async fn poll_once(&self) {
        let pack = match self.backend.pack_detail(&self.pack_id).await {
            Ok(pack) => pack,
            Err(e) => {
                tracing::warn!(pack_id = %self.pack_id, error = %e, "status poll failed");
                return;
            }
        };

        let effects = {
            let mut state = self.state.lock().await;
            let effects = state.machine.apply_poll(&pack.sources);
            state.pack = Some(pack);
            state.polled_at = Some(chrono::Utc::now().to_rfc3339());
            effects
        };
        for effect in effects {
            self.run_effect(effect).await;
        }
        self.publish().await;
    }

    async fn run_effect(&self, effect: MachineEffect) {
        match effect {
            MachineEffect::FetchCreditCheck { source_id } => {
                match self.backend.credit_check(&source_id).await {
                    Ok(check) => {
                        let opened = self.state.lock().await.machine.open_credit_check(&check);
                        if opened {
                            tracing::info!(
                                source_id = %source_id,
                                credits_required = check.credits_required,
                                user_credits = check.user_credits,
                                "credit check ready"
                            );
                        }
                    }
                    Err(e) => {
                        tracing::warn!(source_id = %source_id, error = %e, "credit check failed");
                        self.state
                            .lock()
                            .await
                            .machine
                            .credit_check_failed(&source_id);
                    }
                }
            }
        }
    }

    /// Start analysis for the source in the open credit check. The choice
    /// is only recorded once the backend accepts it. The modal stays up until
    /// a poll confirms the job is running.
    pub async fn start_analysis(&self, choice: AnalysisChoice) -> Result<StartRequest, ActionError> {
        let request = self.state.lock().await.machine.start_analysis(choice)?;
        if let Err(e) = self
            .backend
            .start_analysis(&request.source_id, request.max_chunks)
            .await
        {
            tracing::error!(source_id = %request.source_id, error = %e, "failed to start analysis");
            return Err(e.into());
        }
        self.state.lock().await.machine.commit_start(&request);
        tracing::info!(
            source_id = %request.source_id,
            max_chunks = ?request.max_chunks,
            "analysis started"
        );
        Ok(request)
    }

    /// Source the user last started, if it hasn't finished.
    pub async fn active_source(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .machine
            .active_source()
            .map(str::to_string)
    }

    /// Partial-run limit recorded for `source_id`.
    pub async fn chunk_limit(&self, source_id: &str) -> Option<u32> {
        self.state.lock().await.machine.chunk_limit(source_id)
    }

    /// Cancel the active (or first cancelable) source, wait the grace
    /// period, then refresh. Returns the cancelled source id.
    pub async fn cancel(&self) -> Result<String, ActionError> {
        let target = {
            let state = self.state.lock().await;
            let sources = state
                .pack
                .as_ref()
                .map(|p| p.sources.as_slice())
                .unwrap_or_default();
            state.machine.cancel_target(sources)
        }
        .ok_or(MachineError::NothingToCancel)?;

        if let Err(e) = self.backend.cancel(&target).await {
            tracing::error!(source_id = %target, error = %e, "cancel failed");
            return Err(e.into());
        }
        tracing::info!(source_id = %target, "cancel requested");

        tokio::time::sleep(self.cancel_grace).await;
        self.poll_once().await;
        Ok(target)
    }

    /// Close whatever modal is showing.
    pub async fn dismiss(&self) -> bool {
        let dismissed = self.state.lock().await.machine.dismiss();
        if dismissed {
            self.publish().await;
        }
        dismissed
    }

    /// Re-open a dismissed credit check for `source_id`.
    pub async fn retry_credit_check(&self, source_id: &str) -> bool {
        let effect = self.state.lock().await.machine.retry_credit_check(source_id);
        let Some(effect) = effect else {
            return false;
        };
        self.run_effect(effect).await;
        self.publish().await;
        true
    }

    /// Download the finished pack text.
    pub async fn download(&self) -> Result<String, ActionError> {
        self.backend.download_pack(&self.pack_id).await.map_err(|e| {
            tracing::error!(pack_id = %self.pack_id, error = %e, "download failed");
            ActionError::LoadResult(e)
        })
    }

    async fn publish(&self) {
        let next = {
            let state = self.state.lock().await;
            let statuses = state
                .pack
                .as_ref()
                .map(|p| state.machine.statuses(&p.sources))
                .unwrap_or_default();
            let outstanding = match &state.pack {
                Some(_) => statuses.iter().any(|s| !s.is_finished()),
                None => true,
            };
            Snapshot {
                pack_id: self.pack_id.clone(),
                statuses,
                modal: state.machine.modal().clone(),
                outstanding,
                polled_at: state.polled_at.clone(),
            }
        };
        let outstanding = next.outstanding;

        let changed = self.snapshot_tx.send_if_modified(|current| {
            if current.same_content(&next) {
                current.polled_at = next.polled_at.clone();
                return false;
            }
            *current = next;
            true
        });
        if changed {
            tracing::debug!(pack_id = %self.pack_id, outstanding, "snapshot updated");
        }

        self.outstanding_tx.send_if_modified(|current| {
            if *current == outstanding {
                return false;
            }
            *current = outstanding;
            true
        });
    }
}
