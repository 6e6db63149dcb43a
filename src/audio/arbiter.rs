//! Audio mode arbitration: exactly one of idle, listening, speaking.
//!
//! Legal transitions are idle -> listening -> idle and idle -> speaking -> idle.
//! Listening and speaking never follow each other directly.
//!
//! The mode lives inside a `tokio::sync::watch` sender. Every transition runs
//! inside `send_if_modified`, which holds the channel's write lock, so the
//! compare-and-set from idle has exactly one winner and subscribers see every
//! change.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use crate::types::AudioMode;

/// Requested mode could not be entered because audio is not idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Audio mode conflict: cannot enter {requested} while {current}")]
pub struct AudioModeConflict {
    pub current: AudioMode,
    pub requested: AudioMode,
}

struct Inner {
    tx: watch::Sender<AudioMode>,
    /// Lease id currently holding a non-idle mode, 0 when idle.
    holder: AtomicU64,
    next_lease: AtomicU64,
}

/// Shared audio mode state machine. Clones refer to the same arbiter.
#[derive(Clone)]
pub struct AudioModeArbiter {
    inner: Arc<Inner>,
}

impl AudioModeArbiter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AudioMode::Idle);
        Self {
            inner: Arc::new(Inner {
                tx,
                holder: AtomicU64::new(0),
                next_lease: AtomicU64::new(1),
            }),
        }
    }

    pub fn mode(&self) -> AudioMode {
        *self.inner.tx.borrow()
    }

    /// Receiver notified on every transition.
    pub fn subscribe(&self) -> watch::Receiver<AudioMode> {
        self.inner.tx.subscribe()
    }

    pub fn request_listen(&self) -> Result<ModeLease, AudioModeConflict> {
        self.request(AudioMode::Listening)
    }

    pub fn request_speak(&self) -> Result<ModeLease, AudioModeConflict> {
        self.request(AudioMode::Speaking)
    }

    /// Force the arbiter back to idle. Idempotent.
    ///
    /// Any outstanding lease becomes inert: dropping it later will not
    /// disturb whoever holds the mode by then.
    pub fn release(&self) {
        let changed = self.inner.tx.send_if_modified(|mode| {
            if *mode == AudioMode::Idle {
                return false;
            }
            *mode = AudioMode::Idle;
            self.inner.holder.store(0, Ordering::SeqCst);
            true
        });
        if changed {
            debug!("[Audio] Forced back to idle");
        }
    }

    fn request(&self, target: AudioMode) -> Result<ModeLease, AudioModeConflict> {
        let id = self.inner.next_lease.fetch_add(1, Ordering::Relaxed);
        let mut current = AudioMode::Idle;

        let won = self.inner.tx.send_if_modified(|mode| {
            current = *mode;
            if *mode != AudioMode::Idle {
                return false;
            }
            *mode = target;
            self.inner.holder.store(id, Ordering::SeqCst);
            true
        });

        if won {
            debug!(mode = %target, "[Audio] Entered");
            Ok(ModeLease {
                arbiter: self.clone(),
                id,
                mode: target,
            })
        } else {
            debug!(current = %current, requested = %target, "[Audio] Request refused");
            Err(AudioModeConflict {
                current,
                requested: target,
            })
        }
    }

    fn release_lease(&self, id: u64) {
        let changed = self.inner.tx.send_if_modified(|mode| {
            if self.inner.holder.load(Ordering::SeqCst) != id {
                return false;
            }
            self.inner.holder.store(0, Ordering::SeqCst);
            *mode = AudioMode::Idle;
            true
        });
        if changed {
            debug!("[Audio] Back to idle");
        }
    }
}

impl Default for AudioModeArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AudioModeArbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioModeArbiter")
            .field("mode", &self.mode())
            .finish()
    }
}

/// Proof of holding a non-idle audio mode. Dropping it returns the arbiter to
/// idle, on success, error and unwind paths alike.
#[must_use = "dropping the lease immediately releases the audio mode"]
pub struct ModeLease {
    arbiter: AudioModeArbiter,
    id: u64,
    mode: AudioMode,
}

impl ModeLease {
    pub fn mode(&self) -> AudioMode {
        self.mode
    }

    /// Release explicitly. Same as dropping.
    pub fn release(self) {}
}

impl Drop for ModeLease {
    fn drop(&mut self) {
        self.arbiter.release_lease(self.id);
    }
}

impl std::fmt::Debug for ModeLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModeLease")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .finish()
    }
}
