//! Progress and status reporting from worker loops back to the caller.
//!
//! The engine never touches caller-owned state directly. Events are pushed
//! through an mpsc channel in emission order; the caller drains them on its
//! own thread (a GUI marshals them onto its event loop, a CLI prints them).

use std::sync::mpsc;

/// One event emitted by a long-running operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Terse user-facing status line (phase changes, failures).
    Status(String),
    /// Bytes transferred so far out of the total, sent after every block.
    Progress {
        /// Bytes completed.
        current: usize,
        /// Total bytes in this operation.
        total: usize,
    },
}

/// Sending half handed to the engine.
///
/// A `Reporter` without a receiver (see [`Reporter::sink`]) drops events,
/// which keeps unit tests and headless callers free of channel plumbing.
#[derive(Debug, Clone)]
pub struct Reporter {
    tx: Option<mpsc::Sender<Event>>,
}

impl Reporter {
    /// Create a connected reporter plus the receiver the caller drains.
    pub fn channel() -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Create a reporter that discards every event.
    pub fn sink() -> Self {
        Self { tx: None }
    }

    /// Emit a user-facing status line. Also mirrored to the `log` stream.
    pub fn status(&self, text: impl Into<String>) {
        let text = text.into();
        log::info!("{text}");
        if let Some(tx) = &self.tx {
            // A disconnected receiver means the caller went away; the
            // operation itself still runs to completion or cancellation.
            let _ = tx.send(Event::Status(text));
        }
    }

    /// Emit a progress update.
    pub fn progress(&self, current: usize, total: usize) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Event::Progress { current, total });
        }
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::sink()
    }
}
