//! Event stream abstraction.
//!
//! Mirrors the lifecycle of a platform event stream: create with a handler,
//! schedule on a run loop, start, stop, invalidate, release (drop). Batches
//! produced by a started stream are posted onto the run loop it was
//! scheduled with and handed to the handler on that loop's thread.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::NativeError;
use super::flags::{CreateFlags, EventFlags};
use super::run_loop::RunLoop;
use crate::events::EventBatch;

/// Receives batches on the run loop's thread.
pub type BatchHandler = Arc<dyn Fn(EventBatch) + Send + Sync + 'static>;

/// Where a new stream starts reporting from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinceWhen {
    /// Only changes that happen after the stream starts.
    Now,
    /// Replay history after the given event id.
    EventId(u64),
}

/// Parameters of a stream at creation time.
#[derive(Debug, Clone)]
pub struct StreamParams {
    /// Watched roots, in caller order. May be empty.
    pub paths: Vec<PathBuf>,
    pub since: SinceWhen,
    /// Coalescing window for rapid successive changes.
    pub latency: Duration,
    pub flags: CreateFlags,
}

/// A native event stream.
pub trait EventStream: Send {
    /// Attach the stream to the loop its batches are delivered on.
    fn schedule_with_run_loop(&mut self, run_loop: Arc<RunLoop>);

    /// Begin producing batches.
    fn start(&mut self) -> Result<(), NativeError>;

    /// Stop producing batches. Batches already queued on the loop are dropped.
    fn stop(&mut self);

    /// Detach from the run loop. The stream cannot be started again.
    fn invalidate(&mut self);
}

/// Creates native streams.
pub trait StreamFactory: Send + Sync {
    fn create(
        &self,
        params: StreamParams,
        handler: BatchHandler,
    ) -> Result<Box<dyn EventStream>, NativeError>;
}

/// Batches a port may have queued on its loop before further ones are folded
/// into a single rescan event.
pub const MAX_BACKLOG: usize = 1024;

/// Delivery side shared by stream implementations.
///
/// Tracks the scheduled loop and whether the stream is live. The live flag is
/// checked both when a batch is posted and when it runs, so a stopped stream
/// never reaches its handler.
///
/// At most [`MAX_BACKLOG`] batches wait on the loop at a time. Past that,
/// batches are dropped and one `MUST_SCAN_SUBDIRS | USER_DROPPED` event per
/// root is queued in their place, so a loop that is stopped or whose thread
/// has exited holds a bounded queue.
#[derive(Clone)]
pub struct DeliveryPort {
    handler: BatchHandler,
    run_loop: Option<Arc<RunLoop>>,
    live: Arc<AtomicBool>,
    /// Jobs posted by this port that have not run yet.
    backlog: Arc<AtomicUsize>,
    /// A rescan event is queued and no batches are accepted until it runs.
    overflowed: Arc<AtomicBool>,
    roots: Vec<String>,
}

impl DeliveryPort {
    pub fn new(handler: BatchHandler) -> Self {
        Self {
            handler,
            run_loop: None,
            live: Arc::new(AtomicBool::new(false)),
            backlog: Arc::new(AtomicUsize::new(0)),
            overflowed: Arc::new(AtomicBool::new(false)),
            roots: Vec::new(),
        }
    }

    /// Paths reported in the rescan event after an overflow. Without roots
    /// the paths of the first dropped batch are used.
    pub fn with_roots(mut self, roots: &[PathBuf]) -> Self {
        self.roots = roots
            .iter()
            .map(|root| root.to_string_lossy().into_owned())
            .collect();
        self
    }

    pub fn attach(&mut self, run_loop: Arc<RunLoop>) {
        self.run_loop = Some(run_loop);
    }

    pub fn detach(&mut self) {
        self.live.store(false, Ordering::Release);
        self.run_loop = None;
    }

    pub fn is_attached(&self) -> bool {
        self.run_loop.is_some()
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::Release);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Number of posted jobs still waiting on the loop.
    pub fn backlog(&self) -> usize {
        self.backlog.load(Ordering::Acquire)
    }

    /// Post `batch` onto the attached loop. Returns `false` if it was dropped.
    pub fn post(&self, batch: EventBatch) -> bool {
        if batch.is_empty() || !self.is_live() {
            return false;
        }
        let Some(run_loop) = &self.run_loop else {
            return false;
        };

        if self.overflowed.load(Ordering::Acquire) {
            tracing::trace!("[port] backlog full, dropped {} events", batch.len());
            return false;
        }
        if self.backlog.fetch_add(1, Ordering::AcqRel) >= MAX_BACKLOG {
            self.backlog.fetch_sub(1, Ordering::AcqRel);
            self.overflow(run_loop, &batch);
            return false;
        }

        self.enqueue(run_loop, batch, false);
        true
    }

    fn overflow(&self, run_loop: &RunLoop, dropped: &EventBatch) {
        if self.overflowed.swap(true, Ordering::AcqRel) {
            return;
        }

        let flags = (EventFlags::MUST_SCAN_SUBDIRS | EventFlags::USER_DROPPED).bits();
        let mut rescan = EventBatch::new();
        if self.roots.is_empty() {
            for path in dropped.paths() {
                rescan.push(path.as_str(), flags, 0);
            }
        } else {
            for root in &self.roots {
                rescan.push(root.as_str(), flags, 0);
            }
        }

        tracing::warn!("[port] backlog of {MAX_BACKLOG} batches reached, events dropped");
        self.backlog.fetch_add(1, Ordering::AcqRel);
        self.enqueue(run_loop, rescan, true);
    }

    fn enqueue(&self, run_loop: &RunLoop, batch: EventBatch, rescan: bool) {
        let handler = self.handler.clone();
        let live = self.live.clone();
        let backlog = self.backlog.clone();
        let overflowed = self.overflowed.clone();
        run_loop.perform(move || {
            backlog.fetch_sub(1, Ordering::AcqRel);
            if rescan {
                overflowed.store(false, Ordering::Release);
            }
            if live.load(Ordering::Acquire) {
                handler(batch);
            }
        });
    }
}
