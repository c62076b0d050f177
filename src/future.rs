//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! Single-assignment result channels used to bridge continuations to callers
//! that want to wait for a result, either by blocking a thread or by `.await`.

use crate::completion_queue::CompletionQueue;
use crate::error::{cancelled, BigtableError};
use tokio::sync::oneshot;

/// The writing half of a result channel. Consumed when the value is set.
#[derive(Debug)]
pub struct Promise<T> {
    tx: oneshot::Sender<Result<T, BigtableError>>,
}

/// The reading half of a result channel.
///
/// If the matching [`Promise`] is dropped without a value, the future resolves
/// to a `Cancelled` error rather than waiting forever.
#[derive(Debug)]
pub struct Future<T> {
    rx: oneshot::Receiver<Result<T, BigtableError>>,
}

/// Create a connected [`Promise`] / [`Future`] pair.
pub fn promise<T>() -> (Promise<T>, Future<T>) {
    let (tx, rx) = oneshot::channel();
    (Promise { tx }, Future { rx })
}

impl<T: Send + 'static> Promise<T> {
    pub fn set_value(self, value: T) {
        self.set_result(Ok(value));
    }

    pub fn set_error(self, err: BigtableError) {
        self.set_result(Err(err));
    }

    pub fn set_result(self, result: Result<T, BigtableError>) {
        // the reader may have given up; that is not an error for the writer
        let _ = self.tx.send(result);
    }

    /// Turn this promise into a continuation suitable for any asynchronous
    /// method in this crate.
    pub fn into_continuation(
        self,
    ) -> impl FnOnce(&CompletionQueue, Result<T, BigtableError>) + Send + 'static {
        move |_cq: &CompletionQueue, result: Result<T, BigtableError>| self.set_result(result)
    }
}

impl<T> Future<T> {
    /// Block the current thread until the value is available.
    ///
    /// This must not be called from within an async runtime context, and must
    /// not be called from a completion queue worker thread (the worker would be
    /// waiting on itself). Use [`Future::wait()`] from async code.
    pub fn get(self) -> Result<T, BigtableError> {
        match self.rx.blocking_recv() {
            Ok(r) => r,
            Err(_) => Err(cancelled("promise dropped without a value")),
        }
    }

    /// Wait for the value without blocking a thread.
    pub async fn wait(self) -> Result<T, BigtableError> {
        match self.rx.await {
            Ok(r) => r,
            Err(_) => Err(cancelled("promise dropped without a value")),
        }
    }

    /// Return the value if it has already been set.
    pub fn try_get(&mut self) -> Option<Result<T, BigtableError>> {
        match self.rx.try_recv() {
            Ok(r) => Some(r),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(Err(cancelled("promise dropped without a value")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BigtableErrorCode;

    #[test]
    fn value_crosses_threads() {
        let (p, f) = promise::<u32>();
        let t = std::thread::spawn(move || p.set_value(42));
        assert_eq!(f.get().unwrap(), 42);
        t.join().unwrap();
    }

    #[test]
    fn dropped_promise_is_cancelled() {
        let (p, f) = promise::<u32>();
        drop(p);
        let e = f.get().unwrap_err();
        assert_eq!(e.code, BigtableErrorCode::Cancelled);
    }

    #[test]
    fn try_get_before_and_after() {
        let (p, mut f) = promise::<&'static str>();
        assert!(f.try_get().is_none());
        p.set_error(BigtableError::new(BigtableErrorCode::NotFound, "gone"));
        let r = f.try_get().unwrap();
        assert_eq!(r.unwrap_err().code, BigtableErrorCode::NotFound);
    }

    #[tokio::test]
    async fn wait_is_awaitable() {
        let (p, f) = promise::<String>();
        std::thread::spawn(move || p.set_value("done".to_string()));
        assert_eq!(f.wait().await.unwrap(), "done");
    }
}
