//! Retry scheduling with exponential backoff and cooldowns

use std::time::Duration;

use tokio::time::Instant;

use crate::{
    config::{RetrySettings, settings::MAX_INTERVAL},
    core::types::ReasonCode,
};

/// Shortest sleep between two loop iterations
pub const MIN_SLEEP: Duration = Duration::from_secs(1);

/// What the scheduler decided after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given delay
    Backoff(Duration),
    /// No attempts until the cooldown has elapsed
    Cooldown(Duration),
}

/// Retry state owned by the agent task
///
/// Entering a cooldown always clears the backoff and the failure count,
/// so the two are never active at the same time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerState {
    fail_count: u32,
    backoff: Option<Duration>,
    cooldown_until: Option<Instant>,
    last_attempt: Option<Instant>,
}

impl SchedulerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_count(&self) -> u32 {
        self.fail_count
    }

    pub fn backoff(&self) -> Option<Duration> {
        self.backoff
    }

    pub fn cooldown_until(&self) -> Option<Instant> {
        self.cooldown_until
    }

    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }

    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        self.cooldown_until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }

    /// Login attempts are spaced at least `grace` apart
    pub fn attempt_allowed(&self, now: Instant, grace: Duration) -> bool {
        self.last_attempt
            .is_none_or(|last| now.saturating_duration_since(last) >= grace)
    }

    pub fn mark_attempt(&mut self, now: Instant) {
        self.last_attempt = Some(now);
    }

    /// Record a failed attempt classified as `reason`
    pub fn record_failure(
        &mut self,
        reason: &ReasonCode,
        retry: &RetrySettings,
        now: Instant,
    ) -> RetryDecision {
        if reason.is_fatal() {
            return self.enter_cooldown(retry.cooldown_on_fatal(), now);
        }

        self.fail_count += 1;
        let backoff = match self.backoff {
            None => retry.initial_backoff(),
            Some(previous) => previous.saturating_mul(2).min(retry.max_backoff()),
        };
        self.backoff = Some(backoff);

        if self.fail_count >= retry.max_consecutive_failures {
            return self.enter_cooldown(retry.max_backoff(), now);
        }

        RetryDecision::Backoff(backoff)
    }

    /// Login confirmed: retry immediately on the next drop
    pub fn record_success(&mut self, now: Instant) {
        self.fail_count = 0;
        self.backoff = None;
        self.cooldown_until = None;
        self.last_attempt = Some(now);
    }

    /// Network changed: everything learned about the old network is stale
    pub fn on_network_event(&mut self) {
        self.fail_count = 0;
        self.backoff = None;
        self.cooldown_until = None;
    }

    /// Online or away from the target network
    pub fn mark_healthy(&mut self) {
        self.fail_count = 0;
        self.backoff = None;
    }

    /// Delay before the next iteration: the backoff if one is pending,
    /// otherwise the base interval shifted by `jitter`, at least one second
    pub fn next_delay(&self, base: Duration, jitter: f64) -> Duration {
        if let Some(backoff) = self.backoff {
            return backoff;
        }

        Duration::try_from_secs_f64(base.as_secs_f64() + jitter)
            .unwrap_or(base)
            .max(MIN_SLEEP)
    }

    fn enter_cooldown(&mut self, duration: Duration, now: Instant) -> RetryDecision {
        self.fail_count = 0;
        self.backoff = None;
        self.cooldown_until = Some(
            now.checked_add(duration)
                .unwrap_or_else(|| now + MAX_INTERVAL),
        );
        RetryDecision::Cooldown(duration)
    }
}
