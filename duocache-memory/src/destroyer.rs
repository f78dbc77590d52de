//! # Destruction Off The Hot Path
//!
//! Purpose: run evicted values' destructors somewhere other than the
//! thread that triggered eviction, so a cache holding expensive-to-drop
//! values (large decoded buffers, GPU handles) never pays that cost while
//! holding the cache lock. This is the "release on main thread / release
//! asynchronously" pair from spec §4.1 and §5's destruction executor policy,
//! expressed as the injected interface the design notes call for.

use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;

use crate::config::DestructionExecutor;

/// Runs [`DestructionExecutor`] policy for a single [`crate::MemoryCache`].
///
/// `Background` lazily starts one dedicated worker thread that receives
/// batches of evicted values and drops them; the thread is joined on
/// `Drop` so no destructor work leaks past the cache's lifetime.
pub struct Destroyer<V> {
    executor: DestructionExecutor<V>,
    sender: Option<Sender<Vec<V>>>,
    worker: Option<JoinHandle<()>>,
}

impl<V> Destroyer<V>
where
    V: Send + 'static,
{
    pub fn new(executor: DestructionExecutor<V>) -> Self {
        let (sender, worker) = match &executor {
            DestructionExecutor::Background => {
                let (tx, rx) = mpsc::channel::<Vec<V>>();
                let handle = std::thread::Builder::new()
                    .name("duocache-destroyer".into())
                    .spawn(move || {
                        while let Ok(batch) = rx.recv() {
                            drop(batch);
                        }
                    })
                    .expect("spawn destroyer thread");
                (Some(tx), Some(handle))
            }
            DestructionExecutor::Inline | DestructionExecutor::Custom(_) => (None, None),
        };

        Destroyer {
            executor,
            sender,
            worker,
        }
    }

    /// Hands a batch of evicted values to the configured executor. Empty
    /// batches are a no-op so callers need not special-case them.
    pub fn destroy(&self, values: Vec<V>) {
        if values.is_empty() {
            return;
        }

        match &self.executor {
            DestructionExecutor::Inline => drop(values),
            DestructionExecutor::Background => {
                if let Some(sender) = &self.sender {
                    // If the worker thread has gone away the channel send
                    // fails; fall back to dropping inline rather than
                    // leaking the batch.
                    if sender.send(values).is_err() {
                        tracing::warn!("destroyer thread unavailable, dropping inline");
                    }
                }
            }
            DestructionExecutor::Custom(dispatch) => dispatch(values),
        }
    }
}

impl<V> Drop for Destroyer<V> {
    fn drop(&mut self) {
        // Dropping the sender unblocks the worker's `recv` loop.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn inline_runs_synchronously() {
        let dropped = Arc::new(AtomicUsize::new(0));
        struct Counted(Arc<AtomicUsize>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let destroyer = Destroyer::new(DestructionExecutor::Inline);
        destroyer.destroy(vec![Counted(dropped.clone())]);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn background_eventually_drops() {
        let dropped = Arc::new(AtomicUsize::new(0));
        struct Counted(Arc<AtomicUsize>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let destroyer = Destroyer::new(DestructionExecutor::Background);
        destroyer.destroy(vec![Counted(dropped.clone()), Counted(dropped.clone())]);
        drop(destroyer);
        assert_eq!(dropped.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn custom_dispatcher_is_invoked() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let destroyer: Destroyer<i32> = Destroyer::new(DestructionExecutor::Custom(Arc::new(
            move |values: Vec<i32>| {
                seen_clone.fetch_add(values.len(), Ordering::SeqCst);
            },
        )));
        destroyer.destroy(vec![1, 2, 3]);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        let _ = Duration::from_millis(0);
    }
}
