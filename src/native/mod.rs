//! Native notification layer.
//!
//! # Architecture
//!
//! ```text
//! StreamFactory::create(params, handler) -> Box<dyn EventStream>
//!   schedule_with_run_loop(loop)   attach to the delivering loop
//!   start()                        begin producing batches
//!         |
//!         v  DeliveryPort::post(batch)
//! RunLoop (owning thread)  --->  handler(batch)
//! ```
//!
//! Two factories ship with the crate: [`NotifyStreams`] watches the real
//! filesystem through `notify`, [`ManualStreams`] is driven by the caller.

pub mod flags;
pub mod manual;
pub mod notify_streams;
mod run_loop;
mod stream;

use std::path::PathBuf;

use thiserror::Error;

pub use flags::{CreateFlags, EventFlags};
pub use manual::{ManualHandle, ManualStreams, StreamStatus};
pub use notify_streams::NotifyStreams;
pub use run_loop::{LoopId, RunLoop};
pub use stream::{
    BatchHandler, DeliveryPort, EventStream, MAX_BACKLOG, SinceWhen, StreamFactory,
    StreamParams,
};

/// Errors from native stream operations.
#[derive(Error, Debug)]
pub enum NativeError {
    #[error("Stream must be scheduled on a run loop before it is started")]
    NotScheduled,

    #[error("Stream was invalidated")]
    Invalidated,

    #[error("Cannot watch path {path}: {source}")]
    PathWatchFailed {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Failed to initialize watcher: {0}")]
    Backend(#[from] notify::Error),

    #[error("Stream creation rejected: {reason}")]
    CreateRejected { reason: String },

    #[error("Stream start rejected: {reason}")]
    StartRejected { reason: String },

    #[error("Unsupported stream option: {0}")]
    Unsupported(String),
}
