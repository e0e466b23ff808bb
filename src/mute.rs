use std::sync::{Arc, Weak};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MuteError {
    #[error("mute state used outside of its provider")]
    ProviderDropped,
}

struct Inner {
    muted: Mutex<bool>,
    subscribers: Mutex<Vec<Sender<bool>>>,
}

/// Owns the session-wide mute flag. Every item gets a [`MuteHandle`] from
/// here; handles stop working once the provider is dropped.
pub struct MuteProvider {
    inner: Arc<Inner>,
}

impl MuteProvider {
    pub fn new() -> Self {
        Self::with_initial(true)
    }

    pub fn with_initial(muted: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                muted: Mutex::new(muted),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn handle(&self) -> MuteHandle {
        MuteHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl Default for MuteProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct MuteHandle {
    inner: Weak<Inner>,
}

impl MuteHandle {
    /// A handle with no provider behind it. Every call fails.
    pub fn detached() -> Self {
        Self { inner: Weak::new() }
    }

    fn inner(&self) -> Result<Arc<Inner>, MuteError> {
        self.inner.upgrade().ok_or(MuteError::ProviderDropped)
    }

    pub fn is_muted(&self) -> Result<bool, MuteError> {
        Ok(*self.inner()?.muted.lock())
    }

    /// Flips the flag and notifies subscribers before returning the new value.
    pub fn toggle(&self) -> Result<bool, MuteError> {
        let inner = self.inner()?;
        let muted = {
            let mut guard = inner.muted.lock();
            *guard = !*guard;
            *guard
        };
        inner
            .subscribers
            .lock()
            .retain(|tx| tx.send(muted).is_ok());
        tracing::debug!(muted, "mute toggled");
        Ok(muted)
    }

    pub fn subscribe(&self) -> Result<Receiver<bool>, MuteError> {
        let inner = self.inner()?;
        let (tx, rx) = unbounded();
        inner.subscribers.lock().push(tx);
        Ok(rx)
    }
}
