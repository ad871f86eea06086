//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use fsevents_bridge::{Result, Runtime, ThreadKey};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// A thread blocked in `Runtime::run_loop`.
pub struct LoopThread {
    pub key: ThreadKey,
    handle: JoinHandle<Result<()>>,
}

impl LoopThread {
    /// Wait for `run_loop` to return and hand back its result.
    pub fn join(self) -> Result<()> {
        self.handle.join().expect("loop thread panicked")
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Spawn a thread that runs its loop, and wait until the loop is registered.
pub fn spawn_loop(runtime: &Runtime) -> LoopThread {
    let (tx, rx) = bounded(1);
    let worker = runtime.clone();
    let handle = thread::spawn(move || {
        let key = ThreadKey::current();
        tx.send(key).unwrap();
        worker.run_loop(key)
    });

    let key = rx.recv_timeout(TIMEOUT).expect("loop thread did not start");
    wait_until(|| runtime.is_loop_registered(key));
    LoopThread { key, handle }
}

/// Poll `condition` until it holds, panicking after [`TIMEOUT`].
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}
