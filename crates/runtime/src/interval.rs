//! Fixed-period timer that always calls the latest callback.
//!
//! The callback sits behind a shared cell the timer task reads on every
//! tick, so swapping it never restarts the timer. The timer itself is only
//! re-created when the period changes.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

type Callback = Arc<dyn Fn() + Send + Sync>;

pub struct IntervalRunner {
    callback: Arc<RwLock<Callback>>,
    period: watch::Sender<Option<Duration>>,
    task: JoinHandle<()>,
}

impl IntervalRunner {
    /// Start the runner. `None` (or a zero period) means disabled.
    pub fn new(callback: impl Fn() + Send + Sync + 'static, period: Option<Duration>) -> Self {
        let callback: Arc<RwLock<Callback>> = Arc::new(RwLock::new(Arc::new(callback)));
        let (period_tx, period_rx) = watch::channel(period);
        let task = tokio::spawn(run(Arc::clone(&callback), period_rx));
        Self {
            callback,
            period: period_tx,
            task,
        }
    }

    /// Replace the callback. The running timer is untouched.
    pub fn set_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        match self.callback.write() {
            Ok(mut guard) => *guard = Arc::new(callback),
            Err(e) => tracing::error!("RwLock poisoned writing interval callback: {e}"),
        }
    }

    /// Change the period. Same period: no-op. `None`: stop. Every tick
    /// re-reads the period before invoking, so a tick that has not reached
    /// the callback yet is skipped. One already inside the callback still
    /// completes, possibly after this returns on a multi-threaded runtime.
    pub fn set_period(&self, period: Option<Duration>) {
        self.period.send_if_modified(|current| {
            if *current == period {
                return false;
            }
            *current = period;
            true
        });
    }

    pub fn period(&self) -> Option<Duration> {
        *self.period.borrow()
    }

    /// Call the latest callback once, outside the timer.
    pub fn invoke_now(&self) {
        if let Some(callback) = latest(&self.callback) {
            callback();
        }
    }
}

impl Drop for IntervalRunner {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn latest(cell: &RwLock<Callback>) -> Option<Callback> {
    match cell.read() {
        Ok(guard) => Some(Arc::clone(&guard)),
        Err(e) => {
            tracing::error!("RwLock poisoned reading interval callback: {e}");
            None
        }
    }
}

async fn run(callback: Arc<RwLock<Callback>>, mut period_rx: watch::Receiver<Option<Duration>>) {
    loop {
        let period = *period_rx.borrow_and_update();
        match period {
            Some(p) if !p.is_zero() => {
                let mut ticker = tokio::time::interval_at(Instant::now() + p, p);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        // Period changes win over a tick that is due at the same time.
                        biased;
                        changed = period_rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            break;
                        }
                        _ = ticker.tick() => {
                            if *period_rx.borrow() != Some(p) {
                                continue;
                            }
                            if let Some(cb) = latest(&callback) {
                                cb();
                            }
                        }
                    }
                }
            }
            _ => {
                if period_rx.changed().await.is_err() {
                    return;
                }
            }
        }
    }
}
