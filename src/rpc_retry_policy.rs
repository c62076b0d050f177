//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! Retry policies: stateful decisions about whether a failed attempt should
//! be tried again.

use crate::error::BigtableError;
use std::fmt::Debug;
use std::time::{Duration, Instant};

/// Trait defining a retry policy.
///
/// An instance tracks the failures of a single logical operation and is not
/// reusable once exhausted. Clients keep a prototype and call
/// [`clone_policy()`](RetryPolicy::clone_policy()) to get a fresh instance for
/// each operation.
pub trait RetryPolicy: Send + Sync + Debug {
    /// Record a failed attempt.
    ///
    /// Returns true if the operation should be attempted again: the failure is
    /// transient and the policy is not exhausted.
    fn on_failure(&mut self, err: &BigtableError) -> bool;

    /// True once the attempt or time budget is spent.
    fn is_exhausted(&self) -> bool;

    /// A new instance with the same configuration and an unspent budget.
    fn clone_policy(&self) -> Box<dyn RetryPolicy>;
}

impl Clone for Box<dyn RetryPolicy> {
    fn clone(&self) -> Box<dyn RetryPolicy> {
        self.clone_policy()
    }
}

/// Retry transient failures until a total number of attempts has been made.
#[derive(Debug, Clone)]
pub struct LimitedAttemptsRetryPolicy {
    maximum_attempts: u32,
    failures: u32,
}

impl LimitedAttemptsRetryPolicy {
    /// Allow at most `maximum_attempts` attempts, including the first one.
    pub fn new(maximum_attempts: u32) -> Self {
        LimitedAttemptsRetryPolicy {
            maximum_attempts: maximum_attempts.max(1),
            failures: 0,
        }
    }
}

impl RetryPolicy for LimitedAttemptsRetryPolicy {
    fn on_failure(&mut self, err: &BigtableError) -> bool {
        self.failures = self.failures.saturating_add(1);
        err.is_transient() && !self.is_exhausted()
    }

    fn is_exhausted(&self) -> bool {
        self.failures >= self.maximum_attempts
    }

    fn clone_policy(&self) -> Box<dyn RetryPolicy> {
        Box::new(LimitedAttemptsRetryPolicy::new(self.maximum_attempts))
    }
}

/// Retry transient failures until a fixed amount of time has elapsed since the
/// policy instance was created.
#[derive(Debug, Clone)]
pub struct LimitedTimeRetryPolicy {
    maximum_duration: Duration,
    deadline: Instant,
}

impl LimitedTimeRetryPolicy {
    pub fn new(maximum_duration: Duration) -> Self {
        LimitedTimeRetryPolicy {
            maximum_duration,
            deadline: Instant::now() + maximum_duration,
        }
    }

    pub fn maximum_duration(&self) -> Duration {
        self.maximum_duration
    }
}

impl RetryPolicy for LimitedTimeRetryPolicy {
    fn on_failure(&mut self, err: &BigtableError) -> bool {
        err.is_transient() && !self.is_exhausted()
    }

    fn is_exhausted(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn clone_policy(&self) -> Box<dyn RetryPolicy> {
        Box::new(LimitedTimeRetryPolicy::new(self.maximum_duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BigtableErrorCode;

    fn transient() -> BigtableError {
        BigtableError::new(BigtableErrorCode::Unavailable, "try again")
    }

    #[test]
    fn attempts_are_counted_exactly() {
        let mut p = LimitedAttemptsRetryPolicy::new(3);
        assert!(!p.is_exhausted());
        assert!(p.on_failure(&transient()));
        assert!(p.on_failure(&transient()));
        // third failure spends the last attempt
        assert!(!p.on_failure(&transient()));
        assert!(p.is_exhausted());
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let mut p = LimitedAttemptsRetryPolicy::new(10);
        let e = BigtableError::new(BigtableErrorCode::NotFound, "no table");
        assert!(!p.on_failure(&e));
        assert!(!p.is_exhausted());
    }

    #[test]
    fn clone_policy_resets_budget() {
        let mut p = LimitedAttemptsRetryPolicy::new(1);
        p.on_failure(&transient());
        assert!(p.is_exhausted());
        let fresh = p.clone_policy();
        assert!(!fresh.is_exhausted());
    }

    #[test]
    fn time_policy_expires() {
        let mut p = LimitedTimeRetryPolicy::new(Duration::from_millis(20));
        assert!(p.on_failure(&transient()));
        std::thread::sleep(Duration::from_millis(30));
        assert!(p.is_exhausted());
        assert!(!p.on_failure(&transient()));
        let fresh = p.clone_policy();
        assert!(!fresh.is_exhausted());
    }
}
