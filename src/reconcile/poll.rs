// This file is part of the terraform-provider-previder project
//
// Copyright (C) ANEO, 2024-2024. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License")
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::ApiError;

use super::{Error, Result};

/// Snapshot of a remote object whose state can be polled
pub trait Observed {
    /// Current state, `None` when the object is absent from the snapshot
    fn observed_state(&self) -> Option<&str>;

    /// Reason of a terminal failure, stops the polling
    fn failure(&self) -> Option<String> {
        None
    }
}

impl<T: Observed> Observed for Option<T> {
    fn observed_state(&self) -> Option<&str> {
        self.as_ref().and_then(Observed::observed_state)
    }
    fn failure(&self) -> Option<String> {
        self.as_ref().and_then(Observed::failure)
    }
}

/// Predicate over the state of a remote object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollCondition {
    Equals(&'static str),
    OneOf(&'static [&'static str]),
    Except(&'static [&'static str]),
}

impl PollCondition {
    pub fn holds(&self, state: &str) -> bool {
        match self {
            Self::Equals(target) => state == *target,
            Self::OneOf(targets) => targets.contains(&state),
            Self::Except(excluded) => !excluded.contains(&state),
        }
    }
}

impl std::fmt::Display for PollCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Equals(target) => f.write_str(target),
            Self::OneOf(targets) => write!(f, "one of {}", targets.join("|")),
            Self::Except(excluded) => write!(f, "not {}", excluded.join("|")),
        }
    }
}

/// Retry schedule: delay between attempts and exact number of attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Constant {
        interval: Duration,
        attempts: u32,
    },
    /// Randomized exponential backoff, also bounded by the total time spent waiting
    Exponential { attempts: u32, max_elapsed: Duration },
}

impl Schedule {
    pub const fn constant(interval: Duration, attempts: u32) -> Self {
        Self::Constant { interval, attempts }
    }

    /// Exponential schedule starting at 500ms, growing by 1.5 up to 60s with 50% jitter, for 15 minutes at most
    pub const fn exponential(attempts: u32) -> Self {
        Self::Exponential {
            attempts,
            max_elapsed: Duration::from_secs(15 * 60),
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Constant { attempts, .. } | Self::Exponential { attempts, .. } => *attempts,
        }
    }

    fn delays(&self) -> Delays {
        match *self {
            Self::Constant { interval, .. } => Delays::Constant(interval),
            Self::Exponential { max_elapsed, .. } => Delays::Exponential(
                ExponentialBackoffBuilder::new()
                    .with_initial_interval(Duration::from_millis(500))
                    .with_multiplier(1.5)
                    .with_max_interval(Duration::from_secs(60))
                    .with_randomization_factor(0.5)
                    .with_max_elapsed_time(Some(max_elapsed))
                    .build(),
            ),
        }
    }
}

/// Delays of one poll run, `None` once the time budget is spent
enum Delays {
    Constant(Duration),
    Exponential(ExponentialBackoff),
}

impl Delays {
    fn next_delay(&mut self) -> Option<Duration> {
        match self {
            Self::Constant(interval) => Some(*interval),
            Self::Exponential(backoff) => backoff.next_backoff(),
        }
    }
}

enum Step<T> {
    Done(T),
    Retry(String),
    Fail(Error),
}

/// Bounded poll loop over one remote object
#[derive(Debug, Clone)]
pub struct Poller<'a> {
    kind: &'static str,
    id: &'a str,
    schedule: Schedule,
    cancel: &'a CancellationToken,
}

impl<'a> Poller<'a> {
    pub fn new(
        kind: &'static str,
        id: &'a str,
        schedule: Schedule,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            kind,
            id,
            schedule,
            cancel,
        }
    }

    /// Poll until the state of the fetched snapshot satisfies `condition`
    ///
    /// Failed fetches count as failed attempts.
    pub async fn wait_for<T, F, Fut>(&self, condition: PollCondition, fetch: F) -> Result<T>
    where
        T: Observed,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        debug!(kind = self.kind, id = self.id, %condition, "Waiting for state");
        self.run(fetch, |fetched| match fetched {
            Ok(snapshot) => {
                if let Some(reason) = snapshot.failure() {
                    return Step::Fail(Error::Failed {
                        kind: self.kind,
                        id: self.id.to_owned(),
                        message: reason,
                    });
                }
                match snapshot.observed_state().map(str::to_owned) {
                    Some(state) if condition.holds(&state) => Step::Done(snapshot),
                    Some(state) => Step::Retry(state),
                    None => Step::Retry(String::from("absent")),
                }
            }
            Err(err) => Step::Retry(err.to_string()),
        })
        .await
    }

    /// Poll until the object is gone
    ///
    /// The object is gone when the fetch reports it as not found, when it is
    /// absent from the snapshot, or when its state no longer matches `pending`.
    pub async fn wait_until_gone<T, F, Fut>(&self, pending: PollCondition, fetch: F) -> Result<()>
    where
        T: Observed,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        debug!(kind = self.kind, id = self.id, %pending, "Waiting for removal");
        self.run(fetch, |fetched| match fetched {
            Ok(snapshot) => match snapshot.observed_state() {
                Some(state) if pending.holds(state) => Step::Retry(state.to_owned()),
                _ => Step::Done(()),
            },
            Err(err) if err.is_not_found() => Step::Done(()),
            Err(err) => Step::Retry(err.to_string()),
        })
        .await
    }

    async fn run<R, T, F, Fut, C>(&self, mut fetch: F, mut check: C) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, ApiError>>,
        C: FnMut(Result<R, ApiError>) -> Step<T>,
    {
        let attempts = self.schedule.attempts();
        let mut delays = self.schedule.delays();
        let mut last_state = String::from("unknown");

        for attempt in 0..attempts {
            if attempt > 0 {
                let Some(delay) = delays.next_delay() else {
                    break;
                };
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(self.cancelled()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if self.cancel.is_cancelled() {
                return Err(self.cancelled());
            }

            match check(fetch().await) {
                Step::Done(value) => {
                    debug!(kind = self.kind, id = self.id, attempt = attempt + 1, "Condition reached");
                    return Ok(value);
                }
                Step::Fail(err) => return Err(err),
                Step::Retry(state) => {
                    debug!(
                        kind = self.kind,
                        id = self.id,
                        attempt = attempt + 1,
                        attempts,
                        state = %state,
                        "Condition not reached yet"
                    );
                    last_state = state;
                }
            }
        }

        Err(Error::Timeout {
            kind: self.kind,
            id: self.id.to_owned(),
            last_state,
        })
    }

    fn cancelled(&self) -> Error {
        Error::Cancelled {
            kind: self.kind,
            id: self.id.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use reqwest::StatusCode;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Snap(&'static str);

    impl Observed for Snap {
        fn observed_state(&self) -> Option<&str> {
            Some(self.0)
        }
        fn failure(&self) -> Option<String> {
            (self.0 == "FAILED").then(|| String::from("disk full"))
        }
    }

    const FAST: Schedule = Schedule::constant(Duration::ZERO, 5);

    fn unavailable() -> ApiError {
        ApiError::from_response(StatusCode::SERVICE_UNAVAILABLE, "try later")
    }

    fn not_found() -> ApiError {
        ApiError::from_response(StatusCode::NOT_FOUND, r#"{"message": "not found"}"#)
    }

    #[test]
    fn conditions() {
        assert!(PollCondition::Equals("READY").holds("READY"));
        assert!(!PollCondition::Equals("READY").holds("NEW"));
        assert!(PollCondition::OneOf(&["READY", "SYNCED"]).holds("SYNCED"));
        assert!(!PollCondition::OneOf(&["READY", "SYNCED"]).holds("DEPLOYING"));
        assert!(PollCondition::Except(&["GRACE_TERMINATED"]).holds("READY"));
        assert!(!PollCondition::Except(&["GRACE_TERMINATED"]).holds("GRACE_TERMINATED"));
    }

    #[test]
    fn exponential_delays_are_bounded() {
        let mut delays = Schedule::exponential(180).delays();
        let first = delays.next_delay().unwrap();
        assert!(first >= Duration::from_millis(250) && first <= Duration::from_millis(750));
        for _ in 0..30 {
            assert!(delays.next_delay().unwrap() <= Duration::from_secs(90));
        }
    }

    #[tokio::test]
    async fn exponential_schedule_stops_when_time_budget_is_spent() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let schedule = Schedule::Exponential {
            attempts: 180,
            max_elapsed: Duration::ZERO,
        };
        let poller = Poller::new("virtual firewall", "fw-1", schedule, &cancel);

        let err = poller
            .wait_for(PollCondition::Equals("READY"), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Snap("DEPLOYING")) }
            })
            .await
            .unwrap_err();

        assert!(calls.load(Ordering::SeqCst) <= 2);
        assert!(matches!(err, Error::Timeout { ref last_state, .. } if last_state == "DEPLOYING"));
    }

    #[tokio::test]
    async fn exhaustion_after_exact_attempt_count() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let poller = Poller::new("cluster", "c1", FAST, &cancel);

        let err = poller
            .wait_for(PollCondition::Equals("READY"), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Snap("DEPLOYING")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        match err {
            Error::Timeout {
                kind,
                id,
                last_state,
            } => {
                assert_eq!(kind, "cluster");
                assert_eq!(id, "c1");
                assert_eq!(last_state, "DEPLOYING");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn transient_errors_count_as_attempts() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let poller = Poller::new("network", "n1", FAST, &cancel);

        let snap = poller
            .wait_for(PollCondition::Equals("READY"), || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    match call {
                        0 | 1 => Err(unavailable()),
                        2 => Ok(Snap("DEPLOYING")),
                        _ => Ok(Snap("READY")),
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(snap, Snap("READY"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn timeout_reports_last_fetch_error() {
        let cancel = CancellationToken::new();
        let poller = Poller::new("network", "n1", Schedule::constant(Duration::ZERO, 2), &cancel);

        let err = poller
            .wait_for(PollCondition::Equals("READY"), || async {
                Err::<Snap, _>(unavailable())
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("503 Service Unavailable: try later"));
    }

    #[tokio::test]
    async fn terminal_failure_stops_polling() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let poller = Poller::new("task", "t1", FAST, &cancel);

        let err = poller
            .wait_for(PollCondition::Equals("COMPLETED"), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Snap("FAILED")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, Error::Failed { ref message, .. } if message == "disk full"));
    }

    #[tokio::test]
    async fn not_found_while_waiting_for_removal_is_success() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let poller = Poller::new("firewall", "f1", FAST, &cancel);

        poller
            .wait_until_gone(PollCondition::Equals("PENDING_REMOVAL"), || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call == 0 {
                        Ok(Snap("PENDING_REMOVAL"))
                    } else {
                        Err(not_found())
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn leaving_pending_state_is_success() {
        let cancel = CancellationToken::new();
        let poller = Poller::new("environment", "e1", FAST, &cancel);

        poller
            .wait_until_gone(PollCondition::Equals("FORCE_REMOVAL"), || async {
                Ok(Snap("DELETED"))
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn other_errors_while_waiting_for_removal_are_retried() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let poller = Poller::new("cluster", "c1", FAST, &cancel);

        let err = poller
            .wait_until_gone(PollCondition::Equals("PENDING_REMOVAL"), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<Snap, _>(unavailable()) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn absent_sub_entity_is_gone() {
        let cancel = CancellationToken::new();
        let poller = Poller::new("volume", "v1", FAST, &cancel);

        poller
            .wait_until_gone(PollCondition::Except(&["GRACE_TERMINATED"]), || async {
                Ok(None::<Snap>)
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);
        let poller = Poller::new("server", "s1", FAST, &cancel);

        let err = poller
            .wait_for(PollCondition::Equals("POWEREDON"), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Snap("POWEREDOFF")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(err, Error::Cancelled { .. }));
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_sleep() {
        let cancel = CancellationToken::new();
        let poller = Poller::new(
            "server",
            "s1",
            Schedule::constant(Duration::from_secs(3600), 3),
            &cancel,
        );

        let err = poller
            .wait_for(PollCondition::Equals("POWEREDON"), || {
                cancel.cancel();
                async { Ok(Snap("POWEREDOFF")) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled { ref id, .. } if id == "s1"));
    }
}
