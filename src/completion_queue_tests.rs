//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::completion_queue::CompletionQueue;
use crate::error::{BigtableError, BigtableErrorCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

fn start_workers(cq: &CompletionQueue, n: usize) -> Vec<JoinHandle<()>> {
    (0..n)
        .map(|i| {
            let cq = cq.clone();
            thread::Builder::new()
                .name(format!("cq-worker-{}", i))
                .spawn(move || cq.run())
                .unwrap()
        })
        .collect()
}

fn stop(cq: &CompletionQueue, workers: Vec<JoinHandle<()>>) {
    cq.shutdown();
    for w in workers {
        w.join().unwrap();
    }
}

#[test]
fn shutdown_is_idempotent() {
    let cq = CompletionQueue::new();
    let workers = start_workers(&cq, 2);
    cq.shutdown();
    cq.shutdown();
    assert!(cq.is_shutdown());
    stop(&cq, workers);
    // run() on a drained, shut down queue returns at once
    cq.run();
    assert_eq!(cq.pending_operations(), 0);
}

#[test]
fn timer_fires_on_worker_thread() {
    let cq = CompletionQueue::new();
    let workers = start_workers(&cq, 1);
    let (tx, rx) = mpsc::channel();
    let start = Instant::now();
    cq.make_relative_timer(Duration::from_millis(20), move |_cq, res| {
        let name = thread::current().name().map(|s| s.to_string());
        tx.send((res, name, start.elapsed())).unwrap();
    });
    let (res, name, elapsed) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(res.is_ok());
    assert_eq!(name.as_deref(), Some("cq-worker-0"));
    assert!(elapsed >= Duration::from_millis(20));
    stop(&cq, workers);
}

#[test]
fn timers_fire_in_deadline_order() {
    let cq = CompletionQueue::new();
    let workers = start_workers(&cq, 1);
    let (tx, rx) = mpsc::channel();
    for ms in [40u64, 10, 25] {
        let tx = tx.clone();
        cq.make_relative_timer(Duration::from_millis(ms), move |_cq, _res| {
            tx.send(ms).unwrap();
        });
    }
    let order: Vec<u64> = (0..3)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    assert_eq!(order, vec![10, 25, 40]);
    stop(&cq, workers);
}

#[test]
fn shutdown_cancels_pending_timers() {
    let cq = CompletionQueue::new();
    let workers = start_workers(&cq, 2);
    let (tx, rx) = mpsc::channel();
    cq.make_relative_timer(Duration::from_secs(3600), move |_cq, res| {
        tx.send(res).unwrap();
    });
    let start = Instant::now();
    stop(&cq, workers);
    assert!(start.elapsed() < Duration::from_secs(5));
    let err = rx.try_recv().unwrap().unwrap_err();
    assert_eq!(err.code, BigtableErrorCode::Cancelled);
}

#[test]
fn in_flight_calls_complete_after_shutdown() {
    let cq = CompletionQueue::new();
    let workers = start_workers(&cq, 2);
    let (tx, rx) = mpsc::channel();
    let done = cq
        .start_call(move |_cq: &CompletionQueue, res: Result<u32, BigtableError>| {
            tx.send(res).unwrap();
        })
        .unwrap();
    cq.shutdown();
    let transport = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        done.complete(Ok(7));
    });
    stop(&cq, workers);
    transport.join().unwrap();
    assert_eq!(rx.try_recv().unwrap(), Ok(7));
}

#[test]
fn operations_after_shutdown_are_cancelled() {
    let cq = CompletionQueue::new();
    cq.shutdown();
    let (tx, rx) = mpsc::channel();
    let tx2 = tx.clone();
    let r = cq.start_call(move |_cq: &CompletionQueue, res: Result<(), BigtableError>| {
        tx.send(res).unwrap();
    });
    assert_eq!(r.unwrap_err().code, BigtableErrorCode::Cancelled);
    cq.make_relative_timer(Duration::from_millis(1), move |_cq, res| {
        tx2.send(res).unwrap();
    });
    assert_eq!(cq.pending_operations(), 2);
    // dispatches both cancellations, then returns
    cq.run();
    for _ in 0..2 {
        let err = rx.try_recv().unwrap().unwrap_err();
        assert!(err.is_cancelled());
    }
}

#[test]
fn dropped_responder_delivers_cancelled() {
    let cq = CompletionQueue::new();
    let workers = start_workers(&cq, 1);
    let (tx, rx) = mpsc::channel();
    let done = cq
        .start_call(move |_cq: &CompletionQueue, res: Result<String, BigtableError>| {
            tx.send(res).unwrap();
        })
        .unwrap();
    drop(done);
    let err = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap_err();
    assert_eq!(err.code, BigtableErrorCode::Cancelled);
    stop(&cq, workers);
}

#[test]
fn responder_map_converts_results() {
    let cq = CompletionQueue::new();
    let workers = start_workers(&cq, 1);
    let (tx, rx) = mpsc::channel();
    for input in ["12", "x"] {
        let tx = tx.clone();
        let done = cq
            .start_call(move |_cq: &CompletionQueue, res: Result<i64, BigtableError>| {
                tx.send(res).unwrap();
            })
            .unwrap();
        let raw = done.map(|s: String| {
            s.parse::<i64>()
                .map_err(|e| BigtableError::new(BigtableErrorCode::Internal, &e.to_string()))
        });
        raw.complete(Ok(input.to_string()));
    }
    let mut results: Vec<Result<i64, BigtableError>> = (0..2)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    results.sort_by_key(|r| r.is_err());
    assert_eq!(results[0], Ok(12));
    assert_eq!(results[1].as_ref().unwrap_err().code, BigtableErrorCode::Internal);
    stop(&cq, workers);
}

#[test]
fn panicking_converter_still_completes_the_call() {
    let cq = CompletionQueue::new();
    let workers = start_workers(&cq, 1);
    let (tx, rx) = mpsc::channel();
    let done = cq
        .start_call(move |_cq: &CompletionQueue, res: Result<u64, BigtableError>| {
            tx.send(res).unwrap();
        })
        .unwrap();
    let raw = done.map(|_s: String| -> Result<u64, BigtableError> { panic!("bad payload") });
    // completed from a transport thread, which must survive too
    let transport = thread::spawn(move || raw.complete(Ok("x".to_string())));
    transport.join().unwrap();
    let err = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap_err();
    assert_eq!(err.code, BigtableErrorCode::Internal);
    assert!(err.message.contains("bad payload"), "{}", err.message);
    stop(&cq, workers);
    assert!(rx.try_recv().is_err());
    assert_eq!(cq.pending_operations(), 0);
}

#[test]
fn huge_relative_timers_are_cancelled_at_shutdown() {
    let cq = CompletionQueue::new();
    let workers = start_workers(&cq, 1);
    let (tx, rx) = mpsc::channel();
    cq.make_relative_timer(Duration::MAX, move |_cq, res| {
        tx.send(res).unwrap();
    });
    stop(&cq, workers);
    assert!(rx.try_recv().unwrap().unwrap_err().is_cancelled());
}

#[test]
fn dropping_queue_cancels_pending_operations() {
    let (tx, rx) = mpsc::channel();
    let done = {
        let cq = CompletionQueue::new();
        let tx2 = tx.clone();
        cq.make_relative_timer(Duration::from_secs(3600), move |_cq, res| {
            tx2.send(res.map(|_| 0)).unwrap();
        });
        cq.start_call(move |_cq: &CompletionQueue, res: Result<i32, BigtableError>| {
            tx.send(res).unwrap();
        })
        .unwrap()
        // no worker ever ran, and the queue is dropped here
    };
    for _ in 0..2 {
        let err = rx.try_recv().unwrap().unwrap_err();
        assert!(err.is_cancelled());
    }
    // completing after the queue is gone is harmless
    done.complete(Ok(1));
    assert!(rx.try_recv().is_err());
}

#[test]
fn panicking_continuation_is_isolated() {
    let cq = CompletionQueue::new();
    let workers = start_workers(&cq, 1);
    cq.make_relative_timer(Duration::from_millis(1), |_cq, _res| {
        panic!("continuation failure");
    });
    let (tx, rx) = mpsc::channel();
    cq.make_relative_timer(Duration::from_millis(10), move |_cq, res| {
        tx.send(res).unwrap();
    });
    assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap().is_ok());
    stop(&cq, workers);
}

#[test]
fn continuations_can_schedule_more_work() {
    let cq = CompletionQueue::new();
    let workers = start_workers(&cq, 2);
    let (tx, rx) = mpsc::channel();
    cq.make_relative_timer(Duration::from_millis(1), move |cq, _res| {
        cq.make_relative_timer(Duration::from_millis(1), move |_cq, res| {
            tx.send(res).unwrap();
        });
    });
    assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap().is_ok());
    stop(&cq, workers);
}

// M operations submitted from T threads, drained by W workers: every
// operation is delivered exactly once.
#[test]
fn concurrent_submissions_are_delivered_exactly_once() {
    const M: usize = 1000;
    const T: usize = 8;
    const W: usize = 4;

    let cq = CompletionQueue::new();
    let workers = start_workers(&cq, W);
    let deliveries: Arc<Vec<AtomicUsize>> = Arc::new((0..M).map(|_| AtomicUsize::new(0)).collect());
    let total = Arc::new(AtomicUsize::new(0));

    let submitters: Vec<JoinHandle<()>> = (0..T)
        .map(|t| {
            let cq = cq.clone();
            let deliveries = Arc::clone(&deliveries);
            let total = Arc::clone(&total);
            thread::spawn(move || {
                for i in (t..M).step_by(T) {
                    let deliveries = Arc::clone(&deliveries);
                    let total = Arc::clone(&total);
                    let record = move |id: usize| {
                        deliveries[id].fetch_add(1, Ordering::SeqCst);
                        total.fetch_add(1, Ordering::SeqCst);
                    };
                    match i % 4 {
                        // timers
                        0 => cq.make_relative_timer(Duration::from_micros((i % 7) as u64), move |_cq, res| {
                            assert!(res.is_ok());
                            record(i);
                        }),
                        // calls completed inline, from another thread, or with an error
                        _ => {
                            let done = cq
                                .start_call(move |_cq: &CompletionQueue, res: Result<usize, BigtableError>| {
                                    if let Ok(id) = res {
                                        assert_eq!(id, i);
                                    }
                                    record(i);
                                })
                                .unwrap();
                            match i % 4 {
                                1 => done.complete(Ok(i)),
                                2 => {
                                    thread::spawn(move || done.complete(Ok(i)));
                                }
                                _ => done.complete(Err(BigtableError::new(
                                    BigtableErrorCode::Unavailable,
                                    "flaky",
                                ))),
                            }
                        }
                    }
                }
            })
        })
        .collect();
    for s in submitters {
        s.join().unwrap();
    }
    stop(&cq, workers);

    assert_eq!(total.load(Ordering::SeqCst), M);
    for (i, d) in deliveries.iter().enumerate() {
        assert_eq!(d.load(Ordering::SeqCst), 1, "operation {} delivered wrongly", i);
    }
}
