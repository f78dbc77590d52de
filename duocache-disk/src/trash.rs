//! # Trash Drain Worker
//!
//! Purpose: `remove_all`'s swap-to-trash protocol makes a manifest clear
//! look instantaneous to the caller by renaming `data/` out of the way and
//! handing the old subtree to this worker, which deletes it off the hot
//! path. A crash between the rename and the drain just leaves an orphaned
//! subdirectory under `trash/`, which [`TrashDrainer::reclaim_existing`]
//! sweeps up the next time the engine opens.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};

/// Background deleter for subtrees moved aside by the swap-to-trash clear.
pub(crate) struct TrashDrainer {
    tx: Sender<PathBuf>,
}

impl TrashDrainer {
    pub(crate) fn spawn() -> Self {
        let (tx, rx) = mpsc::channel::<PathBuf>();
        std::thread::Builder::new()
            .name("duocache-trash-drain".into())
            .spawn(move || {
                while let Ok(path) = rx.recv() {
                    if let Err(err) = std::fs::remove_dir_all(&path) {
                        if err.kind() != std::io::ErrorKind::NotFound {
                            tracing::warn!(?path, %err, "trash drain failed");
                        }
                    }
                }
            })
            .expect("spawn trash-drain thread");
        TrashDrainer { tx }
    }

    /// Hands a subtree (already moved out of `data/`) off for deletion.
    pub(crate) fn schedule(&self, path: PathBuf) {
        let _ = self.tx.send(path);
    }

    /// Schedules every entry already sitting under `trash_dir` for deletion.
    /// Called once at engine open to recover from a crash between a prior
    /// swap's rename and its drain.
    pub(crate) fn reclaim_existing(&self, trash_dir: &Path) {
        let Ok(entries) = std::fs::read_dir(trash_dir) else {
            return;
        };
        for entry in entries.flatten() {
            self.schedule(entry.path());
        }
    }
}
