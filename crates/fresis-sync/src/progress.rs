//! # Progress Events
//!
//! The typed event channel every pipeline produces and the scheduler (or
//! an API layer) consumes.
//!
//! ## Event Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │    5 %  "scaricamento snapshot"                                         │
//! │   20 %  "analisi snapshot"                                              │
//! │   40 %  "sincronizzazione di N record"                                  │
//! │   80 %  "pulizia record obsoleti"      (kinds that prune)               │
//! │  100 %  "completato"                   (exactly once, on success)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Percent values are monotonically non-decreasing; the sender enforces
//! this so consumers never have to. Labels are the Italian UI strings of
//! the host application.

use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::mpsc;

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// 0..=100, non-decreasing within a run.
    pub percent: u8,

    /// Human-readable, localized stage label.
    pub label: String,
}

/// Producer half of the progress channel.
///
/// Send-and-forget: a consumer that went away never blocks or fails a
/// pipeline. Regressing percent values are clamped to the highest value
/// already reported.
#[derive(Debug)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    high_water: AtomicU8,
}

impl ProgressSender {
    /// Creates the channel. The receiver is consumed by the scheduler.
    pub fn channel() -> (ProgressSender, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ProgressSender {
                tx,
                high_water: AtomicU8::new(0),
            },
            rx,
        )
    }

    /// A sender whose events go nowhere, for direct pipeline invocations.
    pub fn discard() -> ProgressSender {
        Self::channel().0
    }

    /// Reports progress. Clamps to the monotone high-water mark.
    pub fn report(&self, percent: u8, label: impl Into<String>) {
        let clamped = percent.min(100);
        let prev = self.high_water.fetch_max(clamped, Ordering::SeqCst);
        let effective = clamped.max(prev);

        let _ = self.tx.send(ProgressEvent {
            percent: effective,
            label: label.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_arrive_in_order() {
        let (tx, mut rx) = ProgressSender::channel();
        tx.report(5, "scaricamento snapshot");
        tx.report(20, "analisi snapshot");

        assert_eq!(rx.try_recv().unwrap().percent, 5);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.percent, 20);
        assert_eq!(second.label, "analisi snapshot");
    }

    #[test]
    fn percent_never_regresses() {
        let (tx, mut rx) = ProgressSender::channel();
        tx.report(80, "pulizia record obsoleti");
        tx.report(40, "late event");

        assert_eq!(rx.try_recv().unwrap().percent, 80);
        assert_eq!(rx.try_recv().unwrap().percent, 80);
    }

    #[test]
    fn dropped_receiver_does_not_fail_the_sender() {
        let (tx, rx) = ProgressSender::channel();
        drop(rx);
        tx.report(100, "completato");
    }
}
