//! # Platform Signal Sources
//!
//! Purpose: the design notes call the host's "low memory" and "entering
//! background" notifications an external event source that should be
//! injected rather than hard-wired, so the cache stays host-agnostic and
//! testable without a real OS notification center. `PlatformSignals` is
//! that seam: a host registers the cache's callbacks with whatever
//! mechanism its platform actually uses (an OS notification center, a
//! signal handler, a GUI framework's lifecycle hook), and the cache never
//! has to know which one.

use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;

/// A host-provided source of platform lifecycle events.
///
/// Implementations register the provided callback with whatever mechanism
/// their platform actually delivers the corresponding event through, and
/// invoke it every time that event fires until the source is dropped.
pub trait PlatformSignals: Send + Sync {
    fn on_memory_pressure(&self, callback: Arc<dyn Fn() + Send + Sync>);
    fn on_background(&self, callback: Arc<dyn Fn() + Send + Sync>);
}

/// The default signal source: never fires. Matches hosts with no platform
/// lifecycle events to forward (e.g. a server process).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSignals;

impl PlatformSignals for NoSignals {
    fn on_memory_pressure(&self, _callback: Arc<dyn Fn() + Send + Sync>) {}
    fn on_background(&self, _callback: Arc<dyn Fn() + Send + Sync>) {}
}

/// A channel-backed signal source for tests and for embedders that already
/// have a thread receiving platform notifications and want to forward them
/// in without implementing the trait themselves.
pub struct ChannelSignals {
    memory_rx: std::sync::Mutex<Option<Receiver<()>>>,
    background_rx: std::sync::Mutex<Option<Receiver<()>>>,
}

/// Paired sender handed back to the caller alongside a [`ChannelSignals`]
/// so tests (or a real platform-notification forwarder) can fire events.
pub struct ChannelSignalsHandle {
    pub memory_tx: Sender<()>,
    pub background_tx: Sender<()>,
}

impl ChannelSignals {
    pub fn new() -> (Self, ChannelSignalsHandle) {
        let (memory_tx, memory_rx) = std::sync::mpsc::channel();
        let (background_tx, background_rx) = std::sync::mpsc::channel();
        (
            ChannelSignals {
                memory_rx: std::sync::Mutex::new(Some(memory_rx)),
                background_rx: std::sync::Mutex::new(Some(background_rx)),
            },
            ChannelSignalsHandle {
                memory_tx,
                background_tx,
            },
        )
    }
}

impl PlatformSignals for ChannelSignals {
    fn on_memory_pressure(&self, callback: Arc<dyn Fn() + Send + Sync>) {
        if let Some(rx) = self.memory_rx.lock().unwrap().take() {
            std::thread::spawn(move || {
                while rx.recv().is_ok() {
                    callback();
                }
            });
        }
    }

    fn on_background(&self, callback: Arc<dyn Fn() + Send + Sync>) {
        if let Some(rx) = self.background_rx.lock().unwrap().take() {
            std::thread::spawn(move || {
                while rx.recv().is_ok() {
                    callback();
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn channel_signals_forward_events() {
        let (signals, handle) = ChannelSignals::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        signals.on_memory_pressure(Arc::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        handle.memory_tx.send(()).unwrap();
        // Give the forwarding thread a moment to run.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
