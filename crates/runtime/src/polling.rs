//! Visibility-aware polling.
//!
//! Polling is active while the caller has enabled it and the host is
//! visible. Becoming active fires one poll immediately, then one per
//! interval. Becoming inactive stops the timer. Each tick spawns the poll
//! without waiting for the previous one, so slow responses may overlap.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::task::JoinHandle;

use crate::interval::IntervalRunner;
use crate::visibility::VisibilitySensor;

struct Inner {
    enabled: AtomicBool,
    active: Mutex<bool>,
    interval: Duration,
    runner: IntervalRunner,
    visibility: VisibilitySensor,
}

pub struct PollingController {
    inner: Arc<Inner>,
    visibility_task: JoinHandle<()>,
}

impl PollingController {
    /// Create a disabled controller. Call [`set_enabled`](Self::set_enabled)
    /// to start.
    pub fn new<F, Fut>(interval: Duration, visibility: VisibilitySensor, on_poll: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let runner = IntervalRunner::new(spawning(on_poll), None);
        let inner = Arc::new(Inner {
            enabled: AtomicBool::new(false),
            active: Mutex::new(false),
            interval,
            runner,
            visibility,
        });

        let mut rx = inner.visibility.subscribe();
        let weak = Arc::downgrade(&inner);
        let visibility_task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.reconcile();
            }
        });

        Self {
            inner,
            visibility_task,
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
        self.inner.reconcile();
    }

    /// Swap the poll operation. Takes effect on the next tick without
    /// resetting the timer.
    pub fn set_on_poll<F, Fut>(&self, on_poll: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.runner.set_callback(spawning(on_poll));
    }

    pub fn is_active(&self) -> bool {
        match self.inner.active.lock() {
            Ok(active) => *active,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }
}

impl Drop for PollingController {
    fn drop(&mut self) {
        self.visibility_task.abort();
    }
}

impl Inner {
    fn reconcile(&self) {
        let should_run = self.enabled.load(Ordering::SeqCst) && self.visibility.is_visible();
        let mut active = match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Mutex poisoned in polling controller, recovering");
                poisoned.into_inner()
            }
        };
        if *active == should_run {
            return;
        }
        *active = should_run;

        if should_run {
            tracing::debug!(interval_ms = self.interval.as_millis() as u64, "polling resumed");
            self.runner.invoke_now();
            self.runner.set_period(Some(self.interval));
        } else {
            tracing::debug!("polling paused");
            self.runner.set_period(None);
        }
    }
}

fn spawning<F, Fut>(on_poll: F) -> impl Fn() + Send + Sync + 'static
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    move || {
        let poll: BoxFuture<'static, ()> = on_poll().boxed();
        tokio::spawn(poll);
    }
}
