//! Per-thread run loop.
//!
//! Every OS thread owns exactly one [`RunLoop`], obtained with
//! [`RunLoop::current`]. Other threads post work onto it with
//! [`RunLoop::perform`]; the work runs when the owning thread calls
//! [`RunLoop::run`], in the order it was posted. [`RunLoop::stop`] may be
//! called from anywhere and makes `run` return after the job in progress.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};

static NEXT_LOOP_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: Arc<RunLoop> = Arc::new(RunLoop::new());
}

/// Identity of a run loop, stable for the lifetime of its thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(u64);

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop-{}", self.0)
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Perform(Job),
    /// Makes a blocked `run` re-check the stop flag.
    Wake,
}

/// A blocking dispatch loop bound to one OS thread.
pub struct RunLoop {
    id: LoopId,
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    /// Set by `stop`, consumed by `run`.
    stop_requested: AtomicBool,
    /// Nesting depth of active `run` calls.
    depth: AtomicUsize,
}

impl RunLoop {
    fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            id: LoopId(NEXT_LOOP_ID.fetch_add(1, Ordering::Relaxed)),
            sender,
            receiver,
            stop_requested: AtomicBool::new(false),
            depth: AtomicUsize::new(0),
        }
    }

    /// The run loop of the calling OS thread.
    pub fn current() -> Arc<RunLoop> {
        CURRENT.with(Arc::clone)
    }

    pub fn id(&self) -> LoopId {
        self.id
    }

    /// Whether a `run` call is currently active on this loop.
    pub fn is_running(&self) -> bool {
        self.depth.load(Ordering::Acquire) > 0
    }

    /// Queue `job` to run on this loop's thread.
    pub fn perform(&self, job: impl FnOnce() + Send + 'static) {
        // The loop holds its own receiver, so the channel never disconnects.
        let _ = self.sender.send(Message::Perform(Box::new(job)));
    }

    /// Ask the loop to return from `run`.
    ///
    /// Never blocks. A request made while the loop is not running is kept and
    /// ends the next `run` immediately, unless it is withdrawn first with
    /// [`cancel_stop`](Self::cancel_stop).
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        let _ = self.sender.send(Message::Wake);
    }

    /// Run queued jobs until [`stop`](Self::stop) is called.
    ///
    /// Meant to be called on the thread that owns the loop. Jobs still queued
    /// when the loop stops stay queued for the next `run`.
    pub fn run(&self) {
        self.depth.fetch_add(1, Ordering::AcqRel);
        tracing::trace!("[loop] {} running", self.id);

        loop {
            if self.stop_requested.swap(false, Ordering::AcqRel) {
                break;
            }
            match self.receiver.recv() {
                Ok(Message::Perform(job)) => job(),
                Ok(Message::Wake) => {}
                Err(_) => break,
            }
        }

        self.depth.fetch_sub(1, Ordering::AcqRel);
        tracing::trace!("[loop] {} stopped", self.id);
    }

    /// Withdraw a stop request that no `run` has observed yet.
    ///
    /// Returns whether one was pending.
    pub fn cancel_stop(&self) -> bool {
        self.stop_requested.swap(false, Ordering::AcqRel)
    }
}

impl fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLoop")
            .field("id", &self.id)
            .field("running", &self.is_running())
            .finish()
    }
}
