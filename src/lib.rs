//! Filesystem event streams delivered through per-thread run loops into a
//! single-lock host runtime.
//!
//! A thread calls [`Runtime::run_loop`] to service its loop. Any thread can
//! then [`schedule`](Runtime::schedule) a stream of paths onto that loop with
//! a [`Callback`]; batches of `(paths, flags)` are delivered on the loop's
//! thread, under the execution lock and the execution context of whoever
//! scheduled the stream. [`Runtime::unschedule`] and [`Runtime::stop`] tear
//! things down again.
//!
//! ```no_run
//! use fsevents_bridge::{Callback, Runtime, ThreadKey};
//!
//! let runtime = Runtime::default();
//! let here = ThreadKey::current();
//!
//! let callback = Callback::new(|rt, paths, flags| {
//!     for (path, flag) in paths.iter().zip(flags) {
//!         println!("{flag:#010x} {path}");
//!     }
//!     rt.stop(fsevents_bridge::ThreadKey::current());
//!     Ok(())
//! });
//! runtime.schedule(here, "project", callback, ["."]).unwrap();
//! runtime.run_loop(here).unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod host;
pub mod logging;
pub mod native;
pub mod registry;
pub mod runtime;

pub use config::{LoggingConfig, Settings, StreamSettings};
pub use context::{ContextScope, ExecutionContext, StreamKey, ThreadKey};
pub use error::{BridgeError, Result};
pub use events::EventBatch;
pub use native::{CreateFlags, EventFlags};
pub use runtime::{Callback, LockedRuntime, Runtime, RuntimeBuilder};
