//! Batch delivery into callbacks on the loop thread.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use common::{TIMEOUT, spawn_loop, wait_until};
use crossbeam_channel::unbounded;
use fsevents_bridge::native::ManualStreams;
use fsevents_bridge::{BridgeError, Callback, ExecutionContext, Runtime, StreamKey, ThreadKey};

fn manual_runtime() -> (Runtime, ManualStreams) {
    let streams = ManualStreams::new();
    (Runtime::new(streams.clone()), streams)
}

#[test]
fn test_paths_and_flags_arrive_paired_in_order() {
    let (runtime, streams) = manual_runtime();
    let worker = spawn_loop(&runtime);
    let (tx, rx) = unbounded();

    let callback = Callback::new(move |_, paths, flags| {
        tx.send((paths.to_vec(), flags.to_vec()))?;
        Ok(())
    });
    runtime
        .schedule(worker.key, "pairs", callback, ["/w"])
        .unwrap();

    let handle = streams.last().unwrap();
    assert!(handle.deliver_events([("/w/a", 0x100), ("/w/b", 0x200), ("/w/c", 0x1000)]));

    let (paths, flags) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(paths, ["/w/a", "/w/b", "/w/c"]);
    assert_eq!(flags, [0x100, 0x200, 0x1000]);

    runtime.stop(worker.key);
    worker.join().unwrap();
}

#[test]
fn test_callback_runs_under_scheduling_context() {
    let (runtime, streams) = manual_runtime();
    let worker = spawn_loop(&runtime);
    let (tx, rx) = unbounded();

    let callback = Callback::new(move |_, _, _| {
        tx.send((
            ExecutionContext::current(),
            ThreadKey::current(),
            thread::current().id(),
        ))?;
        Ok(())
    });
    runtime
        .schedule(worker.key, "ctx", callback, ["/w"])
        .unwrap();
    streams.last().unwrap().deliver_events([("/w/a", 1)]);

    let (context, key, os_thread) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(context, ExecutionContext::current());
    assert_eq!(key, ThreadKey::current());
    // Delivered on the loop's OS thread, not this one
    assert_ne!(os_thread, thread::current().id());
    assert_ne!(key, worker.key);

    runtime.stop(worker.key);
    worker.join().unwrap();
}

#[test]
fn test_callback_error_stops_loop_and_is_reported_once() {
    let (runtime, streams) = manual_runtime();
    let worker = spawn_loop(&runtime);
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    let callback = Callback::new(move |_, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("disk on fire")
    });
    runtime
        .schedule(worker.key, "failing", callback, ["/w"])
        .unwrap();

    let handle = streams.last().unwrap();
    handle.deliver_events([("/w/a", 1)]);
    handle.deliver_events([("/w/b", 1)]);

    let err = worker.join().unwrap_err();
    match &err {
        BridgeError::CallbackFailed { stream, source } => {
            assert_eq!(stream.as_str(), "failing");
            assert!(source.to_string().contains("disk on fire"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_callback_failure());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Other loops start clean
    let again = spawn_loop(&runtime);
    runtime.stop(again.key);
    again.join().unwrap();
}

#[test]
fn test_callback_error_keeps_its_source() {
    let (runtime, streams) = manual_runtime();
    let worker = spawn_loop(&runtime);

    let callback = Callback::new(|_, paths, _| {
        let _: Vec<u32> = serde_json::from_str(&paths[0])?;
        Ok(())
    });
    runtime
        .schedule(worker.key, "decode", callback, ["/w"])
        .unwrap();
    streams.last().unwrap().deliver_events([("not json", 1)]);

    match worker.join().unwrap_err() {
        BridgeError::CallbackFailed { source, .. } => {
            assert!(source.downcast_ref::<serde_json::Error>().is_some());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_panicking_callback_is_invocation_failure() {
    let (runtime, streams) = manual_runtime();
    let worker = spawn_loop(&runtime);

    let callback = Callback::new(|_, _, _| panic!("callback exploded"));
    runtime
        .schedule(worker.key, "panics", callback, ["/w"])
        .unwrap();
    streams.last().unwrap().deliver_events([("/w/a", 1)]);

    let err = worker.join().unwrap_err();
    assert!(matches!(err, BridgeError::CallbackInvocationFailed { .. }));

    // The lock was released during unwinding
    assert!(runtime.is_scheduled(&StreamKey::from("panics")));
}

#[test]
fn test_two_loops_deliver_independently() {
    let (runtime, streams) = manual_runtime();
    let slow_loop = spawn_loop(&runtime);
    let fast_loop = spawn_loop(&runtime);

    let (release_tx, release_rx) = unbounded::<()>();
    let (entered_tx, entered_rx) = unbounded();
    let slow = Callback::new(move |rt, _, _| {
        entered_tx.send(())?;
        // Blocks without holding the execution lock
        rt.allow_threads(|| release_rx.recv_timeout(TIMEOUT))?;
        Ok(())
    });

    let (fast_tx, fast_rx) = unbounded();
    let fast = Callback::new(move |_, paths, _| {
        fast_tx.send(paths.to_vec())?;
        Ok(())
    });

    runtime
        .schedule(slow_loop.key, "slow", slow, ["/slow"])
        .unwrap();
    let slow_handle = streams.last().unwrap();
    runtime
        .schedule(fast_loop.key, "fast", fast, ["/fast"])
        .unwrap();
    let fast_handle = streams.last().unwrap();

    slow_handle.deliver_events([("/slow/a", 1)]);
    entered_rx.recv_timeout(TIMEOUT).unwrap();

    // The slow callback is still blocked while the fast loop delivers
    fast_handle.deliver_events([("/fast/a", 1)]);
    assert_eq!(fast_rx.recv_timeout(TIMEOUT).unwrap(), ["/fast/a"]);

    release_tx.send(()).unwrap();
    runtime.stop(slow_loop.key);
    runtime.stop(fast_loop.key);
    slow_loop.join().unwrap();
    fast_loop.join().unwrap();
}

#[test]
fn test_callback_can_unschedule_its_own_stream() {
    let (runtime, streams) = manual_runtime();
    let worker = spawn_loop(&runtime);
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    let callback = Callback::new(move |rt, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        rt.unschedule(&StreamKey::from("once"))?;
        Ok(())
    });
    runtime
        .schedule(worker.key, "once", callback, ["/w"])
        .unwrap();

    let handle = streams.last().unwrap();
    handle.deliver_events([("/w/a", 1)]);
    wait_until(|| !runtime.is_scheduled(&StreamKey::from("once")));

    // Delivery after unschedule is refused by the stream itself
    assert!(!handle.deliver_events([("/w/b", 1)]));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(handle.status().released);

    runtime.stop(worker.key);
    worker.join().unwrap();
}

#[test]
fn test_batches_queued_before_unschedule_are_dropped() {
    let (runtime, streams) = manual_runtime();
    let worker = spawn_loop(&runtime);
    let calls = Arc::new(AtomicUsize::new(0));

    let (release_tx, release_rx) = unbounded::<()>();
    let (entered_tx, entered_rx) = unbounded();
    let gate = Callback::new(move |rt, _, _| {
        entered_tx.send(())?;
        rt.allow_threads(|| release_rx.recv_timeout(TIMEOUT))?;
        Ok(())
    });
    runtime
        .schedule(worker.key, "gate", gate, ["/gate"])
        .unwrap();
    let gate_handle = streams.last().unwrap();

    let counter = Arc::clone(&calls);
    let counted = Callback::new(move |_, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    runtime
        .schedule(worker.key, "counted", counted, ["/w"])
        .unwrap();
    let counted_handle = streams.last().unwrap();

    // Hold the loop busy, queue a batch behind it, then unschedule
    gate_handle.deliver_events([("/gate/a", 1)]);
    entered_rx.recv_timeout(TIMEOUT).unwrap();
    assert!(counted_handle.deliver_events([("/w/a", 1)]));
    runtime.unschedule(&StreamKey::from("counted")).unwrap();
    release_tx.send(()).unwrap();

    // Reschedule under the same name; the old queued batch must not reach it
    let counter = Arc::clone(&calls);
    let fresh = Callback::new(move |_, _, _| {
        counter.fetch_add(100, Ordering::SeqCst);
        Ok(())
    });
    runtime
        .schedule(worker.key, "counted", fresh, ["/w"])
        .unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    runtime.stop(worker.key);
    worker.join().unwrap();
}
