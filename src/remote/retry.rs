//! Retry and cancellation policy for remote calls
//!
//! Each call gets at most one retry: immediately after a timeout, or after a
//! short fixed delay for other transient failures. Business errors are final.
//! Every attempt races the call's cancellation token, so a superseded call
//! stops at its next suspension point.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::Error;
use crate::config::RemoteConfig;

/// Retry policy for one class of remote call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Deadline for a single attempt
    pub attempt_timeout: Duration,
    /// Pause before retrying a non-timeout failure
    pub retry_delay: Duration,
    /// Total attempts including the first
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(4),
            retry_delay: Duration::from_millis(500),
            max_attempts: 2,
        }
    }
}

impl RetryPolicy {
    /// Policy for scheduler calls (fetch, submit, undo, suspend)
    #[must_use]
    pub fn for_cards(config: &RemoteConfig) -> Self {
        Self {
            attempt_timeout: config.card_timeout,
            retry_delay: config.retry_delay,
            ..Self::default()
        }
    }

    /// Policy for grader calls, which may take tens of seconds
    #[must_use]
    pub fn for_grading(config: &RemoteConfig) -> Self {
        Self {
            attempt_timeout: config.grading_timeout,
            retry_delay: config.retry_delay,
            ..Self::default()
        }
    }

    /// Longest a call under this policy can run
    #[must_use]
    pub fn worst_case(&self) -> Duration {
        let retries = self.max_attempts.saturating_sub(1);
        self.attempt_timeout.saturating_mul(self.max_attempts) + self.retry_delay.saturating_mul(retries)
    }

    /// Run `op` under this policy, recording attempts on `call`
    ///
    /// No attempt runs past the call's deadline.
    pub async fn run<T, F, Fut>(&self, call: &RemoteCall, mut op: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        let token = call.token();

        loop {
            let attempt = call.record_attempt();
            let last = attempt >= self.max_attempts;

            let budget = self
                .attempt_timeout
                .min(call.deadline.saturating_duration_since(Instant::now()));
            let result = tokio::select! {
                () = token.cancelled() => return call.finish(CallOutcome::Cancelled),
                r = tokio::time::timeout(budget, op()) => r,
            };

            let error = match result {
                Ok(Ok(value)) => return call.finish(CallOutcome::Done(value)),
                Ok(Err(e)) => e,
                Err(_) => Error::Timeout(budget),
            };

            if error.is_timeout() {
                if last {
                    tracing::warn!(kind = ?call.kind, attempt, "remote call timed out, giving up");
                    return call.finish(CallOutcome::TimedOut);
                }
                tracing::warn!(kind = ?call.kind, attempt, "remote call timed out, retrying");
                continue;
            }

            if !error.is_transient() || last {
                tracing::warn!(kind = ?call.kind, attempt, error = %error, "remote call failed");
                return call.finish(CallOutcome::Failed(CallFailure::from(&error)));
            }

            tracing::warn!(
                kind = ?call.kind,
                attempt,
                error = %error,
                delay_ms = u64::try_from(self.retry_delay.as_millis()).unwrap_or(u64::MAX),
                "remote call failed, retrying"
            );
            tokio::select! {
                () = token.cancelled() => return call.finish(CallOutcome::Cancelled),
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }
    }
}

/// Determine whether an HTTP status and response body indicate a recoverable error.
///
/// Recoverable errors are worth retrying: rate limits (429), server errors (5xx),
/// and certain transient network-level failures surfaced in the body text.
#[must_use]
pub fn is_recoverable(status: u16, body: &str) -> bool {
    if status == 429 {
        return true;
    }

    if (500..600).contains(&status) {
        return true;
    }

    let lower = body.to_lowercase();
    lower.contains("connection reset") || lower.contains("timed out") || lower.contains("dns error")
}

/// What a remote call was for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    FetchCard,
    SubmitGrade,
    Grade,
    FollowUp,
    Undo,
    Suspend,
}

/// A cancellable unit of remote work owned by one session transition
#[derive(Debug, Clone)]
pub struct RemoteCall {
    pub kind: CallKind,
    /// Transition that issued the call; results from older epochs are stale
    pub epoch: u64,
    /// Latest instant any attempt may still be running
    pub deadline: Instant,
    token: CancellationToken,
    attempts: Arc<watch::Sender<u32>>,
}

impl RemoteCall {
    /// Create a call whose token is a child of `parent`
    #[must_use]
    pub fn new(kind: CallKind, epoch: u64, policy: &RetryPolicy, parent: &CancellationToken) -> Self {
        Self {
            kind,
            epoch,
            deadline: Instant::now() + policy.worst_case(),
            token: parent.child_token(),
            attempts: Arc::new(watch::channel(0).0),
        }
    }

    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        *self.attempts.borrow()
    }

    /// Receiver notified each time a new attempt starts
    #[must_use]
    pub fn watch_attempts(&self) -> watch::Receiver<u32> {
        self.attempts.subscribe()
    }

    fn record_attempt(&self) -> u32 {
        self.attempts.send_modify(|n| *n += 1);
        self.attempts()
    }

    fn finish<T>(&self, outcome: CallOutcome<T>) -> Attempted<T> {
        Attempted {
            attempts: self.attempts(),
            outcome,
        }
    }
}

/// Terminal result of a call after the retry policy ran
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    Done(T),
    /// Every attempt exceeded its deadline
    TimedOut,
    Failed(CallFailure),
    /// Superseded before completion; never applied
    Cancelled,
}

impl<T> CallOutcome<T> {
    /// Transform the success value
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallOutcome<U> {
        match self {
            Self::Done(value) => CallOutcome::Done(f(value)),
            Self::TimedOut => CallOutcome::TimedOut,
            Self::Failed(failure) => CallOutcome::Failed(failure),
            Self::Cancelled => CallOutcome::Cancelled,
        }
    }
}

/// A call outcome plus how many attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub attempts: u32,
    pub outcome: CallOutcome<T>,
}

/// Broad class of a final failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transport failure that survived the retry
    Network,
    /// The reviewer was not showing a card that can be answered
    ReviewerNotReady,
    NotFound,
    /// Any other error reported by the backend
    Backend,
}

/// A failure reduced to what the session needs to tell the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&Error> for CallFailure {
    fn from(error: &Error) -> Self {
        let kind = match error {
            Error::ReviewerNotReady(_) => FailureKind::ReviewerNotReady,
            Error::NotFound(_) => FailureKind::NotFound,
            Error::Http(_) | Error::Io(_) | Error::Timeout(_) => FailureKind::Network,
            e if e.is_transient() => FailureKind::Network,
            _ => FailureKind::Backend,
        };

        Self {
            kind,
            message: error.to_string(),
        }
    }
}
