//! Retry budget, backoff, and the resume policy for range reads.

use crate::error::StreamError;
use crate::types::{Cursor, Event, EventId};
use rand::Rng;
use std::time::Duration;
use tracing::warn;

/// Retry/backoff configuration.
///
/// Range reads are safe to retry: a resumed request starts strictly after
/// the last delivered event, so nothing is delivered twice.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Failed attempts tolerated before giving up.
    pub max_attempts: u32,
    /// Jitter mode for backoff delays (prevents thundering herd)
    pub jitter: JitterMode,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 1.3,
            max_attempts: 10,
            jitter: JitterMode::Full,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Retry straight away, without any delay.
    pub fn immediate() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: JitterMode::None,
            ..Self::default()
        }
    }

    /// Set initial backoff delay
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// Set maximum backoff delay
    pub fn with_max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Set backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the failed-attempt budget
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set jitter mode
    pub fn with_jitter(mut self, jitter: JitterMode) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate the next backoff delay with jitter
    pub fn next_backoff(&self, attempt: u32, current_delay: Duration) -> Duration {
        let base_delay = if attempt == 0 {
            self.initial_backoff.min(self.max_backoff)
        } else {
            let multiplied = current_delay.as_secs_f64() * self.multiplier;
            Duration::from_secs_f64(multiplied.min(self.max_backoff.as_secs_f64()))
        };

        apply_jitter(base_delay, &self.jitter)
    }
}

/// Jitter mode for retry backoff (following AWS SDK patterns).
#[derive(Clone, Debug, Default)]
pub enum JitterMode {
    /// No jitter - use exact backoff delay
    None,
    /// Full jitter: random delay between 0 and calculated backoff
    #[default]
    Full,
    /// Equal jitter: half fixed + half random
    Equal,
}

/// Apply jitter to a backoff delay.
pub fn apply_jitter(delay: Duration, mode: &JitterMode) -> Duration {
    if delay.is_zero() {
        return delay;
    }

    let mut rng = rand::thread_rng();

    match mode {
        JitterMode::None => delay,
        JitterMode::Full => Duration::from_secs_f64(rng.gen::<f64>() * delay.as_secs_f64()),
        JitterMode::Equal => {
            let half = delay.as_secs_f64() / 2.0;
            Duration::from_secs_f64(half + rng.gen::<f64>() * half)
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug)]
pub(crate) enum Resume {
    /// Issue another request from `cursor` after waiting `delay`.
    Retry { cursor: Cursor, delay: Duration },
    /// Budget spent; deliver this terminal error.
    GiveUp(StreamError),
}

/// Per-read retry state.
///
/// Owned by a single read's worker and never shared.
#[derive(Debug)]
pub(crate) struct RetrySession {
    config: RetryConfig,
    attempts: u32,
    cursor: Cursor,
    last_id: Option<EventId>,
    delivered: u64,
    limit: Option<u64>,
    backoff: Duration,
}

impl RetrySession {
    pub(crate) fn new(config: RetryConfig, start: Cursor, limit: Option<u64>) -> Self {
        Self {
            config,
            attempts: 0,
            cursor: start,
            last_id: None,
            delivered: 0,
            limit,
            backoff: Duration::ZERO,
        }
    }

    /// Cursor the next request starts from.
    pub(crate) fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Limit for the next request: whatever is left of the original limit.
    pub(crate) fn remaining(&self) -> Option<u64> {
        self.limit.map(|limit| limit.saturating_sub(self.delivered))
    }

    /// Whether the original limit has been delivered in full.
    pub(crate) fn limit_reached(&self) -> bool {
        self.remaining() == Some(0)
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn last_id(&self) -> Option<&EventId> {
        self.last_id.as_ref()
    }

    /// Note an event on its way to the consumer.
    ///
    /// Called before the handoff so a failure during the handoff still
    /// resumes after this event.
    pub(crate) fn record(&mut self, event: &Event) {
        match event.id() {
            Some(id) => self.last_id = Some(id.clone()),
            None => warn!(
                last_id = ?self.last_id,
                "served event has no id, a resume will not move past it"
            ),
        }
        self.delivered += 1;
    }

    /// Decide how to continue after a transport failure.
    pub(crate) fn on_failure(&mut self, err: StreamError) -> Resume {
        if self.attempts + 1 >= self.config.max_attempts {
            self.attempts += 1;
            return Resume::GiveUp(StreamError::RetriesExhausted {
                attempts: self.attempts,
                last: Box::new(err),
            });
        }

        self.backoff = self.config.next_backoff(self.attempts, self.backoff);
        self.attempts += 1;

        if let Some(id) = &self.last_id {
            self.cursor = Cursor::After(id.clone());
        }

        Resume::Retry {
            cursor: self.cursor.clone(),
            delay: self.backoff,
        }
    }
}
