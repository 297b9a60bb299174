//! Daily token usage tracking with a configurable hard limit.
//!
//! Persists to `<state_dir>/token_usage.json`, reset automatically at
//! midnight UTC.

use crate::error::{GripError, GripResult};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Usage {
    date: String,
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
    request_count: u64,
}

impl Usage {
    fn empty(date: String) -> Self {
        Self { date, prompt_tokens: 0, completion_tokens: 0, total_tokens: 0, request_count: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSummary {
    pub date: String,
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub request_count: u64,
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
}

fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Tracks daily token usage and enforces `max_daily` when it is non-zero.
pub struct TokenTracker {
    usage_file: PathBuf,
    max_daily: u64,
    data: Mutex<Usage>,
}

impl TokenTracker {
    pub fn new(state_dir: impl Into<PathBuf>, max_daily_tokens: u64) -> GripResult<Self> {
        let state_dir = state_dir.into();
        std::fs::create_dir_all(&state_dir)?;
        let usage_file = state_dir.join("token_usage.json");
        let data = Mutex::new(Self::load(&usage_file));
        Ok(Self { usage_file, max_daily: max_daily_tokens, data })
    }

    fn load(usage_file: &std::path::Path) -> Usage {
        if let Ok(text) = std::fs::read_to_string(usage_file) {
            if let Ok(data) = serde_json::from_str::<Usage>(&text) {
                if data.date == today() {
                    return data;
                }
            } else {
                log::warn!("Corrupt token usage file, resetting");
            }
        }
        Usage::empty(today())
    }

    fn save(&self, data: &Usage) -> GripResult<()> {
        let json = serde_json::to_string_pretty(data)?;
        let tmp = self.usage_file.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.usage_file)?;
        Ok(())
    }

    fn roll_if_new_day(&self, data: &mut Usage) {
        let today = today();
        if data.date != today {
            *data = Usage::empty(today);
        }
    }

    /// Call before making an LLM request. Returns `TokenLimitExceeded`
    /// if the daily limit has already been reached.
    pub fn check_limit(&self) -> GripResult<()> {
        let mut data = self.data.lock();
        self.roll_if_new_day(&mut data);
        if self.max_daily > 0 && data.total_tokens >= self.max_daily {
            return Err(GripError::TokenLimitExceeded { used: data.total_tokens, limit: self.max_daily });
        }
        Ok(())
    }

    /// Record tokens from a completed LLM call and persist the new total.
    pub fn record(&self, prompt_tokens: u64, completion_tokens: u64) -> GripResult<()> {
        let mut data = self.data.lock();
        self.roll_if_new_day(&mut data);

        data.prompt_tokens += prompt_tokens;
        data.completion_tokens += completion_tokens;
        data.total_tokens += prompt_tokens + completion_tokens;
        data.request_count += 1;
        self.save(&data)?;

        if self.max_daily > 0 {
            let remaining = self.max_daily.saturating_sub(data.total_tokens);
            if (remaining as f64) < self.max_daily as f64 * 0.1 {
                log::warn!(
                    "Token budget low: {} / {} used ({remaining} remaining)",
                    data.total_tokens,
                    self.max_daily
                );
            }
        }
        Ok(())
    }

    pub fn total_today(&self) -> u64 {
        let mut data = self.data.lock();
        self.roll_if_new_day(&mut data);
        data.total_tokens
    }

    pub fn requests_today(&self) -> u64 {
        let mut data = self.data.lock();
        self.roll_if_new_day(&mut data);
        data.request_count
    }

    /// Remaining tokens today, or `None` if unlimited.
    pub fn remaining(&self) -> Option<u64> {
        if self.max_daily == 0 {
            return None;
        }
        Some(self.max_daily.saturating_sub(self.total_today()))
    }

    pub fn summary(&self) -> UsageSummary {
        let data = self.data.lock().clone();
        UsageSummary {
            date: data.date,
            total_tokens: data.total_tokens,
            prompt_tokens: data.prompt_tokens,
            completion_tokens: data.completion_tokens,
            request_count: data.request_count,
            limit: if self.max_daily > 0 { Some(self.max_daily) } else { None },
            remaining: self.remaining(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TokenTracker::new(dir.path(), 0).unwrap();
        tracker.record(100, 50).unwrap();
        tracker.record(10, 5).unwrap();
        assert_eq!(tracker.total_today(), 165);
        assert_eq!(tracker.requests_today(), 2);
    }

    #[test]
    fn check_limit_errors_when_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TokenTracker::new(dir.path(), 100).unwrap();
        tracker.record(100, 0).unwrap();
        let err = tracker.check_limit().unwrap_err();
        assert!(matches!(err, GripError::TokenLimitExceeded { used: 100, limit: 100 }));
    }

    #[test]
    fn unlimited_when_max_daily_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TokenTracker::new(dir.path(), 0).unwrap();
        assert_eq!(tracker.remaining(), None);
        tracker.record(1_000_000, 0).unwrap();
        tracker.check_limit().unwrap();
    }

    #[test]
    fn persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let tracker = TokenTracker::new(dir.path(), 0).unwrap();
            tracker.record(42, 8).unwrap();
        }
        let tracker2 = TokenTracker::new(dir.path(), 0).unwrap();
        assert_eq!(tracker2.total_today(), 50);
    }
}
