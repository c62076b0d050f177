//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! Retrying asynchronous operations.
//!
//! [`start_retry_async_call()`] drives one logical operation through
//! `Attempting -> BackingOff -> Attempting -> ... -> Terminal`. The operation
//! state is owned by whichever continuation is currently registered on the
//! completion queue, so each step runs as a fresh dispatch on a worker thread
//! and the user continuation fires exactly once, after the final attempt.

use crate::completion_queue::{CompletionQueue, QueueRef, Responder};
use crate::error::{BigtableError, BigtableErrorCode};
use crate::rpc_backoff_policy::BackoffPolicy;
use crate::rpc_retry_policy::RetryPolicy;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, trace};

/// Whether re-sending a request can cause duplicate side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    /// Safe to re-send verbatim after a transient failure.
    Idempotent,
    /// Never retried; the first failure is final.
    NonIdempotent,
}

/// A remote call that can be started any number of times.
///
/// Implementations issue the request and complete `done` exactly once with
/// the outcome, from any thread. Dropping `done` counts as a cancellation.
pub trait AsyncCall: Send + Sync + 'static {
    type Response: Send + 'static;

    /// Name used in log messages.
    fn name(&self) -> &str;

    fn idempotency(&self) -> Idempotency {
        Idempotency::Idempotent
    }

    /// Start attempt number `attempt` (1-based). Calls that need a fresh
    /// request identifier per attempt can derive one from it.
    fn start(&self, attempt: u32, done: Responder<Self::Response>);
}

/// An [`AsyncCall`] built from a closure.
pub struct AsyncCallFn<R, F> {
    name: String,
    idempotency: Idempotency,
    f: F,
    _response: PhantomData<fn() -> R>,
}

impl<R, F> AsyncCallFn<R, F>
where
    R: Send + 'static,
    F: Fn(u32, Responder<R>) + Send + Sync + 'static,
{
    pub fn new(name: &str, idempotency: Idempotency, f: F) -> Self {
        AsyncCallFn {
            name: name.to_string(),
            idempotency,
            f,
            _response: PhantomData,
        }
    }
}

impl<R, F> AsyncCall for AsyncCallFn<R, F>
where
    R: Send + 'static,
    F: Fn(u32, Responder<R>) + Send + Sync + 'static,
{
    type Response = R;

    fn name(&self) -> &str {
        &self.name
    }

    fn idempotency(&self) -> Idempotency {
        self.idempotency
    }

    fn start(&self, attempt: u32, done: Responder<R>) {
        (self.f)(attempt, done)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum OperationState {
    Attempting,
    BackingOff,
    Terminal,
}

type ResultContinuation<R> = Box<dyn FnOnce(&CompletionQueue, Result<R, BigtableError>) + Send>;

struct RetryingOperation<C: AsyncCall> {
    call: Arc<C>,
    retry_policy: Box<dyn RetryPolicy>,
    backoff_policy: Box<dyn BackoffPolicy>,
    attempt: u32,
    state: OperationState,
    last_error: Option<BigtableError>,
    continuation: Option<ResultContinuation<C::Response>>,
    // weak, so a pending retry does not keep its own queue alive
    queue: Weak<QueueRef>,
}

/// Start `call` on `cq`, retrying transient failures as allowed by
/// `retry_policy`, waiting between attempts as directed by `backoff_policy`.
///
/// `continuation` runs exactly once on a worker thread of `cq` with either the
/// response or the final error: a permanent error, the last transient error
/// once the retry policy is exhausted, or `Cancelled` if the queue shuts down
/// while the operation is waiting to retry.
pub fn start_retry_async_call<C, F>(
    cq: &CompletionQueue,
    call: C,
    retry_policy: Box<dyn RetryPolicy>,
    backoff_policy: Box<dyn BackoffPolicy>,
    continuation: F,
) where
    C: AsyncCall,
    F: FnOnce(&CompletionQueue, Result<C::Response, BigtableError>) + Send + 'static,
{
    let op = Box::new(RetryingOperation {
        call: Arc::new(call),
        retry_policy,
        backoff_policy,
        attempt: 0,
        state: OperationState::Attempting,
        last_error: None,
        continuation: Some(Box::new(continuation)),
        queue: cq.downgrade(),
    });
    op.start_attempt(cq);
}

impl<C: AsyncCall> RetryingOperation<C> {
    fn start_attempt(mut self: Box<Self>, cq: &CompletionQueue) {
        self.attempt += 1;
        self.state = OperationState::Attempting;
        let call = Arc::clone(&self.call);
        let attempt = self.attempt;
        trace!("{}: starting attempt {}", call.name(), attempt);
        let registered = cq.start_call(move |cq: &CompletionQueue, result: Result<C::Response, BigtableError>| {
            self.on_attempt_complete(cq, result)
        });
        match registered {
            Ok(done) => call.start(attempt, done),
            // the continuation is already scheduled with the cancellation
            Err(e) => debug!("{}: attempt {} not started: {}", call.name(), attempt, e),
        }
    }

    fn on_attempt_complete(
        mut self: Box<Self>,
        cq: &CompletionQueue,
        result: Result<C::Response, BigtableError>,
    ) {
        let err = match result {
            Ok(response) => return self.finish(cq, Ok(response)),
            Err(e) => e,
        };
        let name = self.call.name().to_string();
        if err.is_cancelled() {
            return self.finish(cq, Err(err));
        }
        if self.call.idempotency() == Idempotency::NonIdempotent {
            debug!("{}: non-idempotent call failed, not retrying: {}", name, err);
            return self.finish(cq, Err(err));
        }
        if !self.retry_policy.on_failure(&err) {
            let err = if err.is_transient() && self.retry_policy.is_exhausted() {
                BigtableError {
                    code: err.code,
                    message: format!(
                        "retry policy exhausted after {} attempts in {}: {}",
                        self.attempt, name, err.message
                    ),
                }
            } else {
                err
            };
            debug!("{}: giving up after attempt {}: {}", name, self.attempt, err);
            return self.finish(cq, Err(err));
        }
        let delay = self.backoff_policy.on_completion();
        trace!(
            "{}: attempt {} failed ({}), retrying in {:?}",
            name,
            self.attempt,
            err,
            delay
        );
        self.last_error = Some(err);
        self.state = OperationState::BackingOff;
        cq.make_relative_timer(delay, move |cq: &CompletionQueue, timer: Result<(), BigtableError>| match timer {
            Ok(()) => self.start_attempt(cq),
            Err(_) => {
                let message = match &self.last_error {
                    Some(last) => format!(
                        "{} cancelled while waiting to retry; last error: {}",
                        name, last
                    ),
                    None => format!("{} cancelled while waiting to retry", name),
                };
                self.finish(cq, Err(BigtableError::new(BigtableErrorCode::Cancelled, &message)))
            }
        });
    }

    fn finish(mut self: Box<Self>, cq: &CompletionQueue, result: Result<C::Response, BigtableError>) {
        debug_assert!(self.state != OperationState::Terminal);
        self.state = OperationState::Terminal;
        if let Some(continuation) = self.continuation.take() {
            continuation(cq, result);
        }
    }
}

// Reached with the continuation still set only when a step unwound, e.g. a
// panicking policy. The failure is posted as a zero-delay timer so the
// continuation runs as a normal dispatch, outside the unwinding frame.
impl<C: AsyncCall> Drop for RetryingOperation<C> {
    fn drop(&mut self) {
        let continuation = match self.continuation.take() {
            Some(c) => c,
            None => return,
        };
        let message = format!(
            "{} aborted by a panic during attempt {}",
            self.call.name(),
            self.attempt
        );
        error!("{}", message);
        self.state = OperationState::Terminal;
        let cq = CompletionQueue::upgrade(&self.queue).unwrap_or_else(|| {
            let orphan = CompletionQueue::new();
            orphan.shutdown();
            orphan
        });
        let err = BigtableError::new(BigtableErrorCode::Internal, &message);
        cq.make_relative_timer(Duration::ZERO, move |cq: &CompletionQueue, _timer: Result<(), BigtableError>| {
            continuation(cq, Err(err))
        });
    }
}
