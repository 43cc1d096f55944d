//! Token-bucket rate limiting keyed by (provider, model).
//!
//! Mirrors the production Python rate limiter this runtime is built
//! around: conservative "effective" limits below the advertised ones,
//! a sliding 120-second ledger, and a cooperative wait until the next
//! minute boundary when the budget is exhausted.

use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tokio::sync::watch;

/// Rate limits for a specific (provider, model) pair.
#[derive(Debug, Clone, Copy)]
pub struct ModelLimits {
    pub rpm: u32,
    pub tpm: u32,
    pub rpd: Option<u32>,
    pub tpd: Option<u32>,
}

impl ModelLimits {
    pub const fn new(rpm: u32, tpm: u32) -> Self {
        Self {
            rpm,
            tpm,
            rpd: None,
            tpd: None,
        }
    }
}

/// Conservative fallback for unrecognised (provider, model) pairs.
const DEFAULT_LIMITS: ModelLimits = ModelLimits::new(30, 20_000);

/// One entry in the sliding-window token ledger.
struct LedgerEntry {
    recorded_at: SystemTime,
    tokens: u32,
}

struct LedgerState {
    limits: ModelLimits,
    buffer_tokens: u32,
    entries: VecDeque<LedgerEntry>,
    tokens_this_minute: u32,
    requests_this_minute: u32,
    minute_bucket: u64,
}

impl LedgerState {
    fn new(limits: ModelLimits) -> Self {
        let buffer_tokens = recommended_buffer_tokens(limits.tpm);
        Self {
            limits,
            buffer_tokens,
            entries: VecDeque::new(),
            tokens_this_minute: 0,
            requests_this_minute: 0,
            minute_bucket: current_minute_bucket(),
        }
    }

    fn effective_tpm(&self) -> u32 {
        self.limits.tpm.saturating_sub(self.buffer_tokens)
    }

    fn effective_rpm(&self) -> u32 {
        self.limits.rpm.saturating_sub(2).max(1)
    }

    /// Evict ledger entries older than 120 seconds and roll the per-minute
    /// counters over if a new minute has started since the last observation.
    fn cleanup(&mut self, now: SystemTime) {
        while let Some(front) = self.entries.front() {
            match now.duration_since(front.recorded_at) {
                Ok(age) if age > Duration::from_secs(120) => {
                    self.entries.pop_front();
                }
                _ => break,
            }
        }

        let bucket = current_minute_bucket();
        if bucket != self.minute_bucket {
            self.minute_bucket = bucket;
            self.tokens_this_minute = 0;
            self.requests_this_minute = 0;
        }
    }
}

fn current_minute_bucket() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        / 60
}

/// Lower buffer for models with higher TPM limits, matching the
/// production heuristic this scales down from.
fn recommended_buffer_tokens(tpm: u32) -> u32 {
    if tpm >= 50_000 {
        2_000
    } else if tpm >= 10_000 {
        1_000
    } else {
        500
    }
}

/// Rough token estimate for a batch of message/tool content: total
/// characters divided by four, floored at 100. Tool schemas serialise
/// larger than they read, so their character count is doubled.
pub fn estimate_tokens(message_texts: &[&str], tool_schema_texts: &[&str]) -> u32 {
    let mut total_chars: usize = message_texts.iter().map(|s| s.len()).sum();
    total_chars += tool_schema_texts
        .iter()
        .map(|s| s.len() * 2)
        .sum::<usize>();
    (total_chars / 4).max(100) as u32
}

/// Outcome of waiting for rate-limit headroom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// No wait was necessary.
    Proceeded,
    /// Waited for the next minute boundary, counters were reset.
    Waited,
    /// Cancelled mid-wait; caller must treat this as `finish_reason=cancelled`.
    Cancelled,
}

/// Token-bucket limiter. One instance lives per process, owned by the
/// `App` constructed at `BuildApp` time, and is shared (via `Arc`) with
/// the agent loop and any signal handler that needs to cancel a wait.
pub struct RateLimiter {
    state: Mutex<LedgerState>,
}

impl RateLimiter {
    pub fn new(limits: ModelLimits) -> Self {
        Self {
            state: Mutex::new(LedgerState::new(limits)),
        }
    }

    /// Swap the active model's limits, resetting counters and re-deriving
    /// the safety buffer for the new model's TPM class.
    pub async fn update_model(&self, limits: ModelLimits) {
        let mut state = self.state.lock().await;
        *state = LedgerState::new(limits);
    }

    /// True iff issuing a request estimated at `est` tokens would stay
    /// within both the effective token and request budgets for the
    /// current minute.
    pub async fn can_proceed(&self, est: u32) -> bool {
        let mut state = self.state.lock().await;
        state.cleanup(SystemTime::now());
        state.tokens_this_minute + est <= state.effective_tpm()
            && state.requests_this_minute < state.effective_rpm()
    }

    /// If `can_proceed(est)` would be false, cooperatively sleep until the
    /// next minute boundary (in one-second ticks so `cancel` is observed
    /// promptly), then zero both per-minute counters. Returns whether a
    /// wait happened, or `Cancelled` if `cancel` fired during the sleep.
    pub async fn smart_delay(&self, est: u32, mut cancel: watch::Receiver<bool>) -> WaitOutcome {
        if self.can_proceed(est).await {
            return WaitOutcome::Proceeded;
        }

        let wait_seconds = {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            let next_minute = (now / 60 + 1) * 60;
            next_minute.saturating_sub(now)
        };

        crate::log(format!(
            "rate limiter: waiting {wait_seconds}s for next minute boundary"
        ));

        let mut remaining = wait_seconds;
        while remaining > 0 {
            if *cancel.borrow() {
                return WaitOutcome::Cancelled;
            }
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(1)) => {
                    remaining -= 1;
                }
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        return WaitOutcome::Cancelled;
                    }
                }
            }
        }

        let mut state = self.state.lock().await;
        state.tokens_this_minute = 0;
        state.requests_this_minute = 0;
        state.minute_bucket = current_minute_bucket();
        WaitOutcome::Waited
    }

    /// Record a successful request's actual token usage: append a ledger
    /// entry and increment both per-minute counters, evicting stale
    /// entries first.
    pub async fn record(&self, tokens_used: u32) {
        let mut state = self.state.lock().await;
        let now = SystemTime::now();
        state.cleanup(now);
        state.entries.push_back(LedgerEntry {
            recorded_at: now,
            tokens: tokens_used,
        });
        state.tokens_this_minute += tokens_used;
        state.requests_this_minute += 1;
    }

    /// Current tokens recorded within this minute (for tests / P2).
    pub async fn tokens_this_minute(&self) -> u32 {
        let mut state = self.state.lock().await;
        state.cleanup(SystemTime::now());
        state.tokens_this_minute
    }

    pub async fn effective_tpm(&self) -> u32 {
        self.state.lock().await.effective_tpm()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_LIMITS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_floor() {
        assert_eq!(estimate_tokens(&["hi"], &[]), 100);
    }

    #[test]
    fn test_estimate_tokens_tool_double_weighted() {
        let tool_schema = "x".repeat(400);
        let est = estimate_tokens(&[], &[&tool_schema]);
        // 400 chars * 2 / 4 = 200
        assert_eq!(est, 200);
    }

    #[tokio::test]
    async fn test_can_proceed_respects_tpm() {
        let limiter = RateLimiter::new(ModelLimits::new(30, 1_000));
        // effective_tpm = 1000 - 500 (low tpm buffer) = 500
        assert!(limiter.can_proceed(400).await);
        limiter.record(400).await;
        assert!(!limiter.can_proceed(200).await);
    }

    #[tokio::test]
    async fn test_record_updates_ledger() {
        let limiter = RateLimiter::new(ModelLimits::new(100, 100_000));
        limiter.record(500).await;
        assert_eq!(limiter.tokens_this_minute().await, 500);
    }

    #[tokio::test]
    async fn test_update_model_resets_counters() {
        let limiter = RateLimiter::new(ModelLimits::new(100, 100_000));
        limiter.record(500).await;
        limiter.update_model(ModelLimits::new(50, 50_000)).await;
        assert_eq!(limiter.tokens_this_minute().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_during_wait() {
        let limiter = RateLimiter::new(ModelLimits::new(30, 1_000));
        limiter.record(900).await;
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let outcome = limiter.smart_delay(50, rx).await;
        assert_eq!(outcome, WaitOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_proceeds_without_waiting() {
        let limiter = RateLimiter::new(ModelLimits::new(100, 100_000));
        let (_tx, rx) = watch::channel(false);
        let outcome = limiter.smart_delay(10, rx).await;
        assert_eq!(outcome, WaitOutcome::Proceeded);
    }
}
