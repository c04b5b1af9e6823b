//! Single-assignment completion slot
//!
//! Every path that can finish a build (the pipeline itself and any
//! background task it started) delivers into the same slot. The first
//! delivery wins; later ones are dropped.

use modsmith_errors::Error;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use crate::packaging::BuildOutput;

type Slot = Arc<Mutex<Option<oneshot::Sender<Result<BuildOutput, Error>>>>>;

/// Shared handle to a build's completion slot
#[derive(Clone)]
pub struct Completion {
    slot: Slot,
}

/// Receiving end of a completion slot
pub type CompletionReceiver = oneshot::Receiver<Result<BuildOutput, Error>>;

impl Completion {
    #[must_use]
    pub fn new() -> (Self, CompletionReceiver) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Deliver an outcome. Returns `false` if one was already delivered.
    pub fn deliver(&self, result: Result<BuildOutput, Error>) -> bool {
        let sender = match self.slot.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(sender) => {
                if let Err(result) = sender.send(result) {
                    tracing::debug!(ok = result.is_ok(), "build outcome delivered after receiver dropped");
                }
                true
            }
            None => {
                if let Err(err) = &result {
                    tracing::debug!(error = %err, "discarding late build failure");
                }
                false
            }
        }
    }

    /// Deliver a failure
    pub fn fail(&self, error: Error) -> bool {
        self.deliver(Err(error))
    }

    /// Whether an outcome has been delivered
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        match self.slot.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("delivered", &self.is_delivered())
            .finish()
    }
}
