//! Fixed-window, per-IP request rate limiting for the gateway, plus a
//! second global window shared across every caller.

use std::collections::HashMap;
use std::time::Instant;

struct Window {
    count: u32,
    started_at: Instant,
}

struct Bucket {
    limit: u32,
    windows: parking_lot::Mutex<HashMap<String, Window>>,
}

impl Bucket {
    fn new(limit: u32) -> Self {
        Self { limit, windows: parking_lot::Mutex::new(HashMap::new()) }
    }

    /// Returns true if a request keyed by `key` is allowed under this
    /// bucket's limit, consuming one unit of quota if so.
    fn check(&self, key: &str) -> bool {
        if self.limit == 0 {
            return true;
        }
        let mut windows = self.windows.lock();
        let now = Instant::now();
        let window = windows.entry(key.to_string()).or_insert(Window { count: 0, started_at: now });
        if now.duration_since(window.started_at).as_secs() >= 60 {
            window.count = 0;
            window.started_at = now;
        }
        if window.count >= self.limit {
            false
        } else {
            window.count += 1;
            true
        }
    }
}

/// Enforces `gateway.api.rate_limit_per_minute` (one shared window for
/// the whole server) and `rate_limit_per_minute_per_ip` (one window
/// per caller) at once — a request must pass both to proceed.
pub struct RateLimiter {
    global: Bucket,
    per_ip: Bucket,
}

impl RateLimiter {
    pub fn new(global_per_minute: u32, per_ip_per_minute: u32) -> Self {
        Self { global: Bucket::new(global_per_minute), per_ip: Bucket::new(per_ip_per_minute) }
    }

    pub fn check(&self, ip: &str) -> bool {
        self.global.check("*") && self.per_ip.check(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_ip_limit_blocks_after_threshold() {
        let rl = RateLimiter::new(0, 2);
        assert!(rl.check("1.1.1.1"));
        assert!(rl.check("1.1.1.1"));
        assert!(!rl.check("1.1.1.1"));
        assert!(rl.check("2.2.2.2"));
    }

    #[test]
    fn global_limit_applies_across_ips() {
        let rl = RateLimiter::new(2, 0);
        assert!(rl.check("1.1.1.1"));
        assert!(rl.check("2.2.2.2"));
        assert!(!rl.check("3.3.3.3"));
    }

    #[test]
    fn zero_limit_is_unlimited() {
        let rl = RateLimiter::new(0, 0);
        for _ in 0..1000 {
            assert!(rl.check("1.1.1.1"));
        }
    }
}
