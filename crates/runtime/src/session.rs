//! Wires a reconciler to a polling controller.
//!
//! Polling runs while the reconciler reports outstanding work and the host
//! is visible. It stops by itself once every source is finished.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::PollingConfig;
use crate::polling::PollingController;
use crate::reconciler::Reconciler;
use crate::visibility::VisibilitySensor;

pub struct WatchSession {
    reconciler: Arc<Reconciler>,
    controller: Arc<PollingController>,
    enable_task: JoinHandle<()>,
}

impl WatchSession {
    pub fn start(reconciler: Arc<Reconciler>, visibility: VisibilitySensor, config: &PollingConfig) -> Self {
        let poll_target = Arc::clone(&reconciler);
        let controller = Arc::new(PollingController::new(config.interval, visibility, move || {
            let reconciler = Arc::clone(&poll_target);
            async move { reconciler.poll_once().await }
        }));

        let mut outstanding = reconciler.outstanding();
        controller.set_enabled(*outstanding.borrow_and_update());

        let ctl = Arc::clone(&controller);
        let enable_task = tokio::spawn(async move {
            while outstanding.changed().await.is_ok() {
                let enabled = *outstanding.borrow_and_update();
                if !enabled {
                    tracing::info!("all sources finished, polling stopped");
                }
                ctl.set_enabled(enabled);
            }
        });

        tracing::info!(
            pack_id = reconciler.pack_id(),
            interval_ms = config.interval.as_millis() as u64,
            "watch session started"
        );
        Self {
            reconciler,
            controller,
            enable_task,
        }
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn is_polling(&self) -> bool {
        self.controller.is_active()
    }

    /// Resolve once no source has outstanding work.
    pub async fn run_until_settled(&self) {
        let mut outstanding = self.reconciler.outstanding();
        let _ = outstanding.wait_for(|o| !*o).await;
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.enable_task.abort();
    }
}
