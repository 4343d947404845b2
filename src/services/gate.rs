//! One-shot gate between the operator's form submission and the pipeline.
//!
//! The pipeline arms the gate for the current asset and suspends on the
//! returned [`GateWait`]. The form side holds a [`SubmissionSignal`]; firing
//! it removes the registered sender before delivering, so a wait resolves at
//! most once no matter how many times the signal fires. A fire names the
//! asset it answers for and is ignored unless that asset is the one armed.

use crate::error::GateError;
use crate::models::{AssetId, SubmissionEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

struct Armed {
    id: u64,
    asset: AssetId,
    tx: oneshot::Sender<SubmissionEvent>,
}

#[derive(Default)]
struct Listener {
    armed: Option<Armed>,
}

#[derive(Default)]
struct Shared {
    listener: Mutex<Listener>,
    next_id: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Listener> {
        self.listener.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Clone, Default)]
pub struct SubmissionGate {
    shared: Arc<Shared>,
}

impl SubmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle used by the form to release the current wait
    pub fn signal(&self) -> SubmissionSignal {
        SubmissionSignal {
            shared: self.shared.clone(),
        }
    }

    /// Registers a listener for `asset`. Only one wait may be outstanding.
    pub fn arm(&self, asset: AssetId) -> Result<GateWait, GateError> {
        let mut listener = self.shared.lock();
        if let Some(armed) = &listener.armed {
            if !armed.tx.is_closed() {
                return Err(GateError::AlreadyArmed);
            }
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        listener.armed = Some(Armed { id, asset, tx });
        Ok(GateWait {
            id,
            rx,
            shared: self.shared.clone(),
        })
    }

    pub fn is_armed(&self) -> bool {
        self.shared.lock().armed.is_some()
    }

    /// Arms the gate for `asset` and waits for its submission
    pub async fn wait_for_submission(
        &self,
        asset: AssetId,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<SubmissionEvent, GateError> {
        self.arm(asset)?.wait(timeout, cancel).await
    }
}

/// An armed wait; dropping it deregisters the listener
pub struct GateWait {
    id: u64,
    rx: oneshot::Receiver<SubmissionEvent>,
    shared: Arc<Shared>,
}

impl GateWait {
    pub async fn wait(
        mut self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<SubmissionEvent, GateError> {
        let received = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, &mut self.rx)
                    .await
                    .map_err(|_| GateError::TimedOut)?
                    .map_err(|_| GateError::Cancelled),
                None => (&mut self.rx).await.map_err(|_| GateError::Cancelled),
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(GateError::Cancelled),
            result = received => result,
        }
    }
}

impl Drop for GateWait {
    fn drop(&mut self) {
        let mut listener = self.shared.lock();
        if matches!(&listener.armed, Some(armed) if armed.id == self.id) {
            listener.armed = None;
        }
    }
}

/// Cloneable trigger held by the submission side
#[derive(Clone)]
pub struct SubmissionSignal {
    shared: Arc<Shared>,
}

impl SubmissionSignal {
    /// Releases the wait armed for `asset`. Returns `false` when nothing was
    /// waiting for that asset, including when its wait already fired. A wait
    /// armed for another asset stays in place.
    pub fn fire(&self, asset: AssetId, event: SubmissionEvent) -> bool {
        let armed = {
            let mut listener = self.shared.lock();
            match &listener.armed {
                Some(armed) if armed.asset == asset => listener.armed.take(),
                _ => None,
            }
        };
        match armed {
            Some(armed) => armed.tx.send(event).is_ok(),
            None => false,
        }
    }

    /// The asset the outstanding wait belongs to
    pub fn armed_for(&self) -> Option<AssetId> {
        self.shared.lock().armed.as_ref().map(|armed| armed.asset)
    }
}
