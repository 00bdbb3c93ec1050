/* Licensed to the Apache Software Foundation (ASF) under one
 * or more contributor license agreements.  See the NOTICE file
 * distributed with this work for additional information
 * regarding copyright ownership.  The ASF licenses this file
 * to you under the Apache License, Version 2.0 (the
 * "License"); you may not use this file except in compliance
 * with the License.  You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing,
 * software distributed under the License is distributed on an
 * "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
 * KIND, either express or implied.  See the License for the
 * specific language governing permissions and limitations
 * under the License.
 */

//! Bounded polling.
//!
//! A [`Retry`] spreads `max_count` trials evenly across `max_duration`:
//!
//! ```text
//! max_count = 3, max_duration = 10s
//!
//! 1st              2nd              3rd
//! v   <- wait ->   v   <- wait ->   v
//! +----------------------------------+
//! 0s                                 10s
//! ```
//!
//! Waits are scheduled against elapsed time, so a slow trial eats into the next
//! wait instead of stretching the whole run. Exhausting the budget is not an
//! error: the caller inspects [`RetryOutcome::succeeded`].

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub max_count: u32,
    pub max_duration: Duration,
}

impl RetryBudget {
    pub const fn new(max_count: u32, max_duration: Duration) -> Self {
        Self {
            max_count,
            max_duration,
        }
    }

    /// Wait between two consecutive trials. The last trial lands at `max_duration`.
    pub fn round_wait(&self) -> Duration {
        if self.max_count <= 1 {
            Duration::ZERO
        } else {
            self.max_duration / (self.max_count - 1)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub succeeded: bool,
    /// Value seen by the check on the last trial, `None` if that trial failed with
    /// an expected failure.
    pub last_value: Option<T>,
    pub trials: u32,
    pub elapsed: Duration,
}

type FailureFilter<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

pub struct Retry<E> {
    budget: RetryBudget,
    expected_failure: Option<FailureFilter<E>>,
}

impl<E> std::fmt::Debug for Retry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retry")
            .field("budget", &self.budget)
            .field("expected_failure", &self.expected_failure.is_some())
            .finish()
    }
}

impl<E> Retry<E> {
    pub fn new(budget: RetryBudget) -> Self {
        Self {
            budget,
            expected_failure: None,
        }
    }

    /// Failures matching `filter` turn the trial value into "no value" and the
    /// loop continues. Any other failure is returned immediately.
    pub fn expect_failure(mut self, filter: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.expected_failure = Some(Box::new(filter));
        self
    }

    pub fn budget(&self) -> RetryBudget {
        self.budget
    }

    /// Calls `probe` until `check` accepts its value or the budget runs out.
    pub async fn run<T, F, Fut, C>(&self, mut probe: F, check: C) -> Result<RetryOutcome<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(Option<&T>) -> bool,
    {
        let schedule = Schedule::start(self.budget);
        let mut value = None;
        let mut succeeded = false;
        let mut trials = 0;
        for trial in 1..=schedule.max_count {
            trials = trial;
            value = self.settle(probe().await)?;
            succeeded = check(value.as_ref());
            if schedule.finish_trial(trial, succeeded).await {
                break;
            }
        }

        Ok(RetryOutcome {
            succeeded,
            last_value: value,
            trials,
            elapsed: schedule.elapsed(),
        })
    }

    /// Calls `probe` until its value equals `expected`.
    pub async fn run_until_eq<T, F, Fut>(
        &self,
        probe: F,
        expected: T,
    ) -> Result<RetryOutcome<T>, E>
    where
        T: PartialEq,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(probe, |value| value == Some(&expected)).await
    }

    /// Like [`Retry::run`], but every trial also calls `result_probe` after `probe`
    /// and only the result probe's value is checked.
    pub async fn run_with_result<A, T, F, FutA, R, FutR, C>(
        &self,
        mut probe: F,
        mut result_probe: R,
        check: C,
    ) -> Result<RetryOutcome<T>, E>
    where
        F: FnMut() -> FutA,
        FutA: Future<Output = Result<A, E>>,
        R: FnMut() -> FutR,
        FutR: Future<Output = Result<T, E>>,
        C: Fn(Option<&T>) -> bool,
    {
        let schedule = Schedule::start(self.budget);
        let mut value = None;
        let mut succeeded = false;
        let mut trials = 0;
        for trial in 1..=schedule.max_count {
            trials = trial;
            self.settle(probe().await)?;
            value = self.settle(result_probe().await)?;
            succeeded = check(value.as_ref());
            if schedule.finish_trial(trial, succeeded).await {
                break;
            }
        }

        Ok(RetryOutcome {
            succeeded,
            last_value: value,
            trials,
            elapsed: schedule.elapsed(),
        })
    }

    fn settle<V>(&self, result: Result<V, E>) -> Result<Option<V>, E> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(error) => match &self.expected_failure {
                Some(filter) if filter(&error) => Ok(None),
                _ => Err(error),
            },
        }
    }
}

struct Schedule {
    started: Instant,
    max_count: u32,
    max_duration: Duration,
    round_wait: Duration,
}

impl Schedule {
    fn start(budget: RetryBudget) -> Self {
        let round_wait = budget.round_wait();
        // A zero count still checks once, without any wait budget.
        let (max_count, max_duration) = if budget.max_count == 0 {
            (1, Duration::ZERO)
        } else {
            (budget.max_count, budget.max_duration)
        };
        debug!("retry round_wait: {:?}", round_wait);
        Self {
            started: Instant::now(),
            max_count,
            max_duration,
            round_wait,
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Returns `true` when the loop has to stop after `trial`.
    async fn finish_trial(&self, trial: u32, succeeded: bool) -> bool {
        let elapsed = self.elapsed();
        debug!(
            "retry: round={}/{}, elapsed={:.2}/{:?}, result={}",
            trial,
            self.max_count,
            elapsed.as_secs_f64(),
            self.max_duration,
            succeeded
        );

        if succeeded || trial >= self.max_count {
            return true;
        }
        if !self.max_duration.is_zero() && elapsed >= self.max_duration {
            return true;
        }
        if !self.round_wait.is_zero() {
            let sleep_time = (self.round_wait * trial).saturating_sub(elapsed);
            if !sleep_time.is_zero() {
                sleep(sleep_time).await;
            }
        }
        false
    }
}
