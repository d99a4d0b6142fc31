//! Host visibility flag.
//!
//! One process-wide boolean, owned by whoever embeds the loop and injected
//! into the polling controller. Starts visible so polling works before any
//! platform listener is attached.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct VisibilitySensor {
    tx: Arc<watch::Sender<bool>>,
}

impl VisibilitySensor {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_visible(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update the flag. Subscribers are only notified on an actual change.
    pub fn set_visible(&self, visible: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == visible {
                return false;
            }
            *current = visible;
            true
        });
        if changed {
            tracing::debug!(visible, "visibility changed");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Attach the platform listener: SIGUSR1 hides, SIGUSR2 shows.
    ///
    /// The listener lives until the returned guard is dropped.
    #[cfg(unix)]
    pub fn listen_unix_signals(&self) -> std::io::Result<ListenerGuard> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hide = signal(SignalKind::user_defined1())?;
        let mut show = signal(SignalKind::user_defined2())?;
        let sensor = self.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(()) = hide.recv() => sensor.set_visible(false),
                    Some(()) = show.recv() => sensor.set_visible(true),
                    else => break,
                }
            }
        });
        Ok(ListenerGuard { task })
    }
}

impl Default for VisibilitySensor {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases a platform listener on drop.
pub struct ListenerGuard {
    task: JoinHandle<()>,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}
