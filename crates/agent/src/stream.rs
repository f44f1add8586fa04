//! Bounded chunk sink for advisory event delivery.
//!
//! Channels that forward status lines or stream chunks over a network hop
//! must never stall the agent loop. The sink buffers into an `mpsc` channel
//! and drops chunks silently when the consumer falls behind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::orchestrator::TextCallback;

/// A drop-on-full chunk buffer.
pub struct BoundedSink {
    tx: mpsc::Sender<String>,
    dropped: AtomicU64,
}

impl BoundedSink {
    /// Create a sink with the given buffer capacity, returning the receiver
    /// side for the consumer task.
    pub fn channel(capacity: usize) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Arc::new(Self {
                tx,
                dropped: AtomicU64::new(0),
            }),
            rx,
        )
    }

    /// Push a chunk. Full buffer (or closed consumer) drops it silently.
    pub fn push(&self, chunk: &str) {
        if self.tx.try_send(chunk.to_string()).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!("Dropped advisory chunk (buffer full)");
        }
    }

    /// How many chunks were dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Adapt into the orchestrator's text callback shape.
    pub fn callback(self: &Arc<Self>) -> TextCallback {
        let sink = self.clone();
        Arc::new(move |chunk: &str| sink.push(chunk))
    }
}
