//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use rand::Rng;
use std::fmt::Debug;
use std::time::Duration;

/// Trait defining how long to wait before the next retry.
///
/// Like [`RetryPolicy`](crate::RetryPolicy), an instance belongs to a single
/// logical operation; clients clone a fresh one from a prototype.
pub trait BackoffPolicy: Send + Sync + Debug {
    /// Record a failed attempt and return the delay before the next one.
    fn on_completion(&mut self) -> Duration;

    /// A new instance with the same configuration, starting from the first delay.
    fn clone_policy(&self) -> Box<dyn BackoffPolicy>;
}

impl Clone for Box<dyn BackoffPolicy> {
    fn clone(&self) -> Box<dyn BackoffPolicy> {
        self.clone_policy()
    }
}

/// Exponentially growing delays, capped at a maximum, with optional jitter.
///
/// With jitter enabled, the n-th delay is drawn uniformly from
/// `[d(n), d(n) * scaling)` (capped), where `d(n)` is the un-jittered delay.
/// Consecutive delays therefore never decrease.
#[derive(Debug, Clone)]
pub struct ExponentialBackoffPolicy {
    initial_delay: Duration,
    maximum_delay: Duration,
    scaling: f64,
    jitter: bool,
    current_delay: Duration,
}

impl ExponentialBackoffPolicy {
    /// Delays start at `initial_delay`, double on each retry, never exceed
    /// `maximum_delay`, and are jittered.
    pub fn new(initial_delay: Duration, maximum_delay: Duration) -> Self {
        ExponentialBackoffPolicy {
            initial_delay,
            maximum_delay: maximum_delay.max(initial_delay),
            scaling: 2.0,
            jitter: true,
            current_delay: initial_delay,
        }
    }

    /// Set the growth factor. Values below 1.0 are treated as 1.0.
    pub fn scaling(mut self, scaling: f64) -> Self {
        self.scaling = if scaling.is_finite() { scaling.max(1.0) } else { 2.0 };
        self
    }

    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

impl BackoffPolicy for ExponentialBackoffPolicy {
    fn on_completion(&mut self) -> Duration {
        let lower = self.current_delay.min(self.maximum_delay);
        // saturates at the maximum instead of overflowing
        let upper = Duration::try_from_secs_f64(self.current_delay.as_secs_f64() * self.scaling)
            .unwrap_or(self.maximum_delay)
            .min(self.maximum_delay)
            .max(lower);
        let (lo, hi) = (lower.as_secs_f64(), upper.as_secs_f64());
        let delay = if self.jitter && lo < hi {
            Duration::try_from_secs_f64(rand::thread_rng().gen_range(lo..hi))
                .unwrap_or(lower)
                .clamp(lower, upper)
        } else {
            lower
        };
        self.current_delay = upper;
        delay
    }

    fn clone_policy(&self) -> Box<dyn BackoffPolicy> {
        Box::new(ExponentialBackoffPolicy {
            current_delay: self.initial_delay,
            ..self.clone()
        })
    }
}

/// Delays growing by a fixed increment: `initial`, `initial + increment`, ...
/// up to `maximum_delay`.
#[derive(Debug, Clone)]
pub struct LinearBackoffPolicy {
    initial_delay: Duration,
    increment: Duration,
    maximum_delay: Duration,
    current_delay: Duration,
}

impl LinearBackoffPolicy {
    pub fn new(initial_delay: Duration, increment: Duration, maximum_delay: Duration) -> Self {
        LinearBackoffPolicy {
            initial_delay,
            increment,
            maximum_delay: maximum_delay.max(initial_delay),
            current_delay: initial_delay,
        }
    }
}

impl BackoffPolicy for LinearBackoffPolicy {
    fn on_completion(&mut self) -> Duration {
        let delay = self.current_delay.min(self.maximum_delay);
        self.current_delay = self
            .current_delay
            .saturating_add(self.increment)
            .min(self.maximum_delay);
        delay
    }

    fn clone_policy(&self) -> Box<dyn BackoffPolicy> {
        Box::new(LinearBackoffPolicy::new(
            self.initial_delay,
            self.increment,
            self.maximum_delay,
        ))
    }
}
