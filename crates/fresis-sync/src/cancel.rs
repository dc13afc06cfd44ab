//! # Cooperative Cancellation
//!
//! The serialization token the scheduler hands to a pipeline doubles as
//! its stop signal. Cancellation is strictly cooperative: pipelines poll
//! [`StopSignal::is_tripped`] at their checkpoints (start, post-download,
//! post-parse, every tenth record of the reconciliation loop) and return a
//! tagged "stopped" error; nothing is ever aborted mid-statement.
//!
//! The shutdown protocol trips every active token and awaits completion;
//! a pipeline is guaranteed to return within one checkpoint interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The polling side of a cancellation handle.
///
/// Implemented by [`StopToken`] in production and by counting fakes in the
/// pipeline tests.
pub trait StopSignal: Send + Sync {
    /// True once a stop has been requested.
    fn is_tripped(&self) -> bool;
}

/// A trip-once flag shared between the scheduler and one pipeline run.
#[derive(Debug, Default)]
pub struct StopToken {
    tripped: AtomicBool,
}

impl StopToken {
    pub fn new() -> Arc<Self> {
        Arc::new(StopToken::default())
    }

    /// Requests a stop. Idempotent.
    pub fn trip(&self) {
        self.tripped.store(true, Ordering::SeqCst);
    }
}

impl StopSignal for StopToken {
    fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}

impl StopSignal for Arc<StopToken> {
    fn is_tripped(&self) -> bool {
        self.as_ref().is_tripped()
    }
}

/// A signal that never trips, for manual one-shot runs without a
/// registered token.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverStop;

impl StopSignal for NeverStop {
    fn is_tripped(&self) -> bool {
        false
    }
}
