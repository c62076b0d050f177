//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! The completion queue: the point where asynchronous operations are
//! registered and where their completions are dispatched to continuations.
//!
//! Every asynchronous call and every timer is tracked as a pending operation
//! under a unique tag. Transports report results through a [`Responder`];
//! worker threads calling [`CompletionQueue::run()`] pick up completed tags
//! and invoke the matching continuation, exactly once, on the worker thread.

use crate::error::{cancelled, BigtableError, BigtableErrorCode};
use std::cmp::Reverse;
use std::any::Any;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

pub(crate) type Tag = u64;

const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// What happened to a pending operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Event {
    Completed,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum OperationKind {
    Call,
    Timer,
}

type Continuation = Box<dyn FnOnce(&CompletionQueue, Event) + Send>;

struct PendingOperation {
    kind: OperationKind,
    cancelled: bool,
    continuation: Continuation,
}

#[derive(Default)]
struct QueueState {
    pending: HashMap<Tag, PendingOperation>,
    ready: VecDeque<(Tag, Event)>,
    timers: BinaryHeap<Reverse<(Instant, Tag)>>,
    next_tag: Tag,
    shutdown: bool,
}

pub(crate) struct QueueRef {
    // the only shared mutable structure; never held while a continuation runs
    state: Mutex<QueueState>,
    cv: Condvar,
}

/// **A thread-safe multiplexer for asynchronous operations.**
///
/// Create one queue, start one or more worker threads calling
/// [`run()`](CompletionQueue::run()), and pass the queue to every asynchronous
/// method. Calling [`shutdown()`](CompletionQueue::shutdown()) stops new work
/// from being accepted; `run()` returns once every pending operation has
/// completed or been cancelled.
///
/// Like the client handles in this crate, the queue uses an [`Arc`] internally,
/// so `.clone()` returns another reference to the same queue.
///
/// ```no_run
/// use bigtable_rust_sdk::CompletionQueue;
/// use std::time::Duration;
///
/// let cq = CompletionQueue::new();
/// let workers: Vec<_> = (0..2)
///     .map(|_| {
///         let cq = cq.clone();
///         std::thread::spawn(move || cq.run())
///     })
///     .collect();
/// cq.make_relative_timer(Duration::from_millis(10), |_cq, res| {
///     println!("timer fired: {:?}", res);
/// });
/// cq.shutdown();
/// for w in workers {
///     w.join().unwrap();
/// }
/// ```
#[derive(Clone)]
pub struct CompletionQueue {
    pub(crate) inner: Arc<QueueRef>,
}

impl Default for CompletionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompletionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = lock(&self.inner.state);
        f.debug_struct("CompletionQueue")
            .field("pending", &st.pending.len())
            .field("timers", &st.timers.len())
            .field("shutdown", &st.shutdown)
            .finish()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CompletionQueue {
    pub fn new() -> CompletionQueue {
        CompletionQueue {
            inner: Arc::new(QueueRef {
                state: Mutex::new(QueueState::default()),
                cv: Condvar::new(),
            }),
        }
    }

    /// Run the event loop on the calling thread.
    ///
    /// Blocks, dispatching completions as they arrive, until the queue has been
    /// shut down and no pending operations remain. Any number of threads may
    /// call this concurrently on the same queue; each completion is delivered on
    /// exactly one of them.
    pub fn run(&self) {
        debug!("completion queue worker started");
        while let Some((tag, op, event)) = self.inner.next_event() {
            dispatch(self, tag, op, event);
        }
        debug!("completion queue worker exiting");
    }

    /// Stop accepting new operations.
    ///
    /// Calls already in flight still complete normally. Pending timers are
    /// cancelled, so their continuations see a `Cancelled` error. Operations
    /// submitted after this point are completed with `Cancelled` without being
    /// started. Calling this more than once has no further effect.
    pub fn shutdown(&self) {
        let mut guard = lock(&self.inner.state);
        let st = &mut *guard;
        if st.shutdown {
            return;
        }
        st.shutdown = true;
        let timers = std::mem::take(&mut st.timers);
        for Reverse((_, tag)) in timers.into_iter() {
            if let Some(op) = st.pending.get_mut(&tag) {
                op.cancelled = true;
                st.ready.push_back((tag, Event::Cancelled));
            }
        }
        debug!(
            "completion queue shutting down: {} pending operations",
            st.pending.len()
        );
        self.inner.cv.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        lock(&self.inner.state).shutdown
    }

    /// Number of operations registered and not yet dispatched.
    pub fn pending_operations(&self) -> usize {
        lock(&self.inner.state).pending.len()
    }

    /// Schedule `f` to run on a worker thread once `duration` has elapsed.
    ///
    /// `f` receives `Ok(())` when the timer expires, or a `Cancelled` error if
    /// the queue shuts down first. No worker thread is blocked while waiting.
    pub fn make_relative_timer<F>(&self, duration: Duration, f: F)
    where
        F: FnOnce(&CompletionQueue, Result<(), BigtableError>) + Send + 'static,
    {
        let now = Instant::now();
        // durations past what Instant can represent never expire before shutdown
        let deadline = now
            .checked_add(duration)
            .unwrap_or_else(|| now + FAR_FUTURE);
        self.make_deadline_timer(deadline, f)
    }

    /// Schedule `f` to run on a worker thread at `deadline`.
    pub fn make_deadline_timer<F>(&self, deadline: Instant, f: F)
    where
        F: FnOnce(&CompletionQueue, Result<(), BigtableError>) + Send + 'static,
    {
        let _ = self.inner.register(
            OperationKind::Timer,
            Some(deadline),
            Box::new(move |cq: &CompletionQueue, event: Event| match event {
                Event::Expired | Event::Completed => f(cq, Ok(())),
                Event::Cancelled => f(cq, Err(cancelled("timer cancelled by queue shutdown"))),
            }),
        );
    }

    /// Register a new call and return the token its transport completes.
    ///
    /// If the queue is already shut down, the continuation is scheduled with a
    /// `Cancelled` error and `Err` is returned so the call is never started.
    pub(crate) fn start_call<T, F>(&self, continuation: F) -> Result<Responder<T>, BigtableError>
    where
        T: Send + 'static,
        F: FnOnce(&CompletionQueue, Result<T, BigtableError>) + Send + 'static,
    {
        let slot: Arc<Mutex<Option<Result<T, BigtableError>>>> = Arc::new(Mutex::new(None));
        let reader = Arc::clone(&slot);
        let registered = self.inner.register(
            OperationKind::Call,
            None,
            Box::new(move |cq: &CompletionQueue, event: Event| {
                let result = match event {
                    Event::Completed => lock(&reader).take().unwrap_or_else(|| {
                        Err(BigtableError::new(
                            BigtableErrorCode::Internal,
                            "call completed without a result",
                        ))
                    }),
                    _ => Err(cancelled("completion queue shut down before the call completed")),
                };
                continuation(cq, result);
            }),
        );
        let tag = match registered {
            Ok(tag) => tag,
            Err(_) => return Err(cancelled("completion queue is shut down")),
        };
        let queue = Arc::downgrade(&self.inner);
        Ok(Responder {
            deliver: Some(Box::new(move |result: Result<T, BigtableError>| {
                *lock(&slot) = Some(result);
                match queue.upgrade() {
                    Some(q) => q.post(tag, Event::Completed),
                    None => trace!("completion for tag {} arrived after its queue was dropped", tag),
                }
            })),
        })
    }

    pub(crate) fn downgrade(&self) -> Weak<QueueRef> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(queue: &Weak<QueueRef>) -> Option<CompletionQueue> {
        queue.upgrade().map(|inner| CompletionQueue { inner })
    }
}

impl QueueRef {
    // Returns Err(tag) when the queue is shut down; the operation is then
    // already scheduled for dispatch with a cancellation.
    fn register(
        &self,
        kind: OperationKind,
        deadline: Option<Instant>,
        continuation: Continuation,
    ) -> Result<Tag, Tag> {
        let mut st = lock(&self.state);
        let tag = st.next_tag;
        st.next_tag += 1;
        let rejected = st.shutdown;
        st.pending.insert(
            tag,
            PendingOperation {
                kind,
                cancelled: rejected,
                continuation,
            },
        );
        if rejected {
            trace!("rejecting {:?} tag {}: queue is shut down", kind, tag);
            st.ready.push_back((tag, Event::Cancelled));
            self.cv.notify_one();
            return Err(tag);
        }
        if let Some(d) = deadline {
            st.timers.push(Reverse((d, tag)));
        }
        trace!("registered {:?} tag {}", kind, tag);
        // a new timer may be earlier than the deadline workers are waiting for
        self.cv.notify_one();
        Ok(tag)
    }

    fn post(&self, tag: Tag, event: Event) {
        let mut st = lock(&self.state);
        if !st.pending.contains_key(&tag) {
            trace!("ignoring {:?} for unknown tag {}", event, tag);
            return;
        }
        st.ready.push_back((tag, event));
        self.cv.notify_one();
    }

    fn next_event(&self) -> Option<(Tag, PendingOperation, Event)> {
        let mut st = lock(&self.state);
        loop {
            while let Some((tag, event)) = st.ready.pop_front() {
                if let Some(op) = st.pending.remove(&tag) {
                    self.wake_if_drained(&st);
                    return Some((tag, op, event));
                }
            }
            let now = Instant::now();
            let mut next_deadline = None;
            while let Some(&Reverse((deadline, tag))) = st.timers.peek() {
                if deadline > now {
                    next_deadline = Some(deadline);
                    break;
                }
                st.timers.pop();
                if let Some(op) = st.pending.remove(&tag) {
                    self.wake_if_drained(&st);
                    return Some((tag, op, Event::Expired));
                }
            }
            if st.shutdown && st.pending.is_empty() {
                self.cv.notify_all();
                return None;
            }
            st = match next_deadline {
                Some(d) => {
                    self.cv
                        .wait_timeout(st, d.saturating_duration_since(now))
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self.cv.wait(st).unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn wake_if_drained(&self, st: &QueueState) {
        if st.shutdown && st.pending.is_empty() {
            self.cv.notify_all();
        }
    }
}

impl Drop for QueueRef {
    fn drop(&mut self) {
        let st = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if st.pending.is_empty() {
            return;
        }
        warn!(
            "completion queue dropped with {} pending operations; cancelling them",
            st.pending.len()
        );
        let mut pending = std::mem::take(&mut st.pending);
        let ready = std::mem::take(&mut st.ready);
        // continuations still need a queue reference; hand them a closed one
        let orphan = CompletionQueue::new();
        orphan.shutdown();
        for (tag, event) in ready {
            if let Some(op) = pending.remove(&tag) {
                dispatch(&orphan, tag, op, event);
            }
        }
        for (tag, op) in pending.drain() {
            dispatch(&orphan, tag, op, Event::Cancelled);
        }
    }
}

fn dispatch(cq: &CompletionQueue, tag: Tag, op: PendingOperation, event: Event) {
    let event = if op.cancelled { Event::Cancelled } else { event };
    trace!("dispatching {:?} tag {}: {:?}", op.kind, tag, event);
    let continuation = op.continuation;
    if let Err(panic) = catch_unwind(AssertUnwindSafe(move || continuation(cq, event))) {
        error!("continuation for tag {} panicked: {}", tag, panic_message(&*panic));
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// One-shot token used by a [`Transport`](crate::Transport) to report the
/// outcome of a call back to its completion queue.
///
/// Consuming the token with [`complete()`](Responder::complete()) is the only
/// way to deliver a result, so a call cannot complete twice. Dropping the token
/// without completing it delivers a `Cancelled` error instead, so the waiting
/// continuation is never leaked.
pub struct Responder<T> {
    deliver: Option<Box<dyn FnOnce(Result<T, BigtableError>) + Send>>,
}

impl<T> std::fmt::Debug for Responder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("completed", &self.deliver.is_none())
            .finish()
    }
}

impl<T: Send + 'static> Responder<T> {
    /// Deliver the outcome of the call.
    pub fn complete(mut self, result: Result<T, BigtableError>) {
        if let Some(deliver) = self.deliver.take() {
            deliver(result);
        }
    }

    /// Adapt this token to a transport producing `U`, converting with `f`.
    ///
    /// If `f` panics the call still completes, with an `Internal` error.
    pub fn map<U, F>(mut self, f: F) -> Responder<U>
    where
        U: Send + 'static,
        F: FnOnce(U) -> Result<T, BigtableError> + Send + 'static,
    {
        let deliver = self.deliver.take();
        Responder {
            deliver: deliver.map(|d| {
                Box::new(move |r: Result<U, BigtableError>| {
                    let converted = catch_unwind(AssertUnwindSafe(move || r.and_then(f)))
                        .unwrap_or_else(|panic| {
                            let msg = panic_message(&*panic);
                            error!("response conversion panicked: {}", msg);
                            Err(BigtableError::new(
                                BigtableErrorCode::Internal,
                                &format!("response conversion panicked: {}", msg),
                            ))
                        });
                    d(converted)
                }) as Box<dyn FnOnce(Result<U, BigtableError>) + Send>
            }),
        }
    }
}

impl<T> Drop for Responder<T> {
    fn drop(&mut self) {
        if let Some(deliver) = self.deliver.take() {
            warn!("responder dropped without a result");
            deliver(Err(cancelled("call abandoned before it completed")));
        }
    }
}
