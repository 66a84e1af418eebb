//! Asynchronous frame ingestion.
//!
//! Delivery callbacks submit owned frames through an unbounded channel; a
//! dispatcher task hands each frame to the blocking pool. Concurrency is
//! unlimited and completion order is unspecified, across cameras and within
//! one camera alike; the per-camera sequence number is the authoritative
//! order downstream.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error};

use super::frame::CapturedFrame;
use super::processor::FrameProcessor;

/// Submission side of the queue, cloned into each delivery callback.
///
/// `submit` never blocks; if the queue is gone the frame is dropped with a
/// diagnostic, which must never disturb the delivery thread.
#[derive(Clone)]
pub struct FrameSubmitter {
    tx: flume::Sender<CapturedFrame>,
}

impl FrameSubmitter {
    pub(crate) fn new(tx: flume::Sender<CapturedFrame>) -> Self {
        Self { tx }
    }

    pub fn submit(&self, frame: CapturedFrame) {
        let serial = frame.serial;
        let sequence = frame.sequence;
        if self.tx.send(frame).is_err() {
            error!(serial, sequence, "frame queue closed; dropping frame");
        }
    }
}

pub struct FrameQueue {
    tx: flume::Sender<CapturedFrame>,
    dispatcher: tokio::task::JoinHandle<()>,
}

impl FrameQueue {
    /// Start the dispatcher on `runtime`.
    pub fn start(runtime: &tokio::runtime::Handle, processor: Arc<FrameProcessor>) -> Self {
        let (tx, rx) = flume::unbounded();
        let dispatcher = runtime.spawn(dispatch(rx, processor));
        Self { tx, dispatcher }
    }

    pub fn submitter(&self) -> FrameSubmitter {
        FrameSubmitter::new(self.tx.clone())
    }

    /// Close the queue and wait for every in-flight frame to finish.
    ///
    /// No cancellation: a frame that entered the queue is processed (or
    /// fails on its own) before this returns.
    pub async fn drain(self) {
        drop(self.tx);
        if let Err(e) = self.dispatcher.await {
            error!(error = %e, "frame dispatcher terminated abnormally");
        }
    }
}

async fn dispatch(rx: flume::Receiver<CapturedFrame>, processor: Arc<FrameProcessor>) {
    let mut workers = JoinSet::new();
    while let Ok(frame) = rx.recv_async().await {
        let processor = Arc::clone(&processor);
        workers.spawn_blocking(move || processor.process(frame));
        // Reap whatever already finished so the set does not grow without
        // bound on long runs.
        while let Some(finished) = workers.try_join_next() {
            if let Err(e) = finished {
                error!(error = %e, "frame worker panicked");
            }
        }
    }
    debug!(in_flight = workers.len(), "frame queue closed; draining workers");
    while let Some(finished) = workers.join_next().await {
        if let Err(e) = finished {
            error!(error = %e, "frame worker panicked");
        }
    }
}
