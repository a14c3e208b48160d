use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

/// Sliding window in-memory rate limiter (pod local).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { store: Arc::new(DashMap::new()), enabled }
    }

    /// Returns true if allowed, false if limited.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled { return true; }
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window { entry.pop_front(); } else { break; }
        }
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            false
        }
    }
}

/// Per-action limits derived from env.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub report_limit: usize,
    pub report_window: Duration,
    pub comment_limit: usize,
    pub comment_window: Duration,
    pub attachment_limit: usize,
    pub attachment_window: Duration,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        fn usize_env(name: &str, default: usize) -> usize { std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default) }
        fn dur_env(name: &str, default: u64) -> Duration { Duration::from_secs(std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)) }
        Self {
            report_limit: usize_env("RL_REPORT_LIMIT", 10),
            report_window: dur_env("RL_REPORT_WINDOW", 300),
            comment_limit: usize_env("RL_COMMENT_LIMIT", 20),
            comment_window: dur_env("RL_COMMENT_WINDOW", 60),
            attachment_limit: usize_env("RL_ATTACHMENT_LIMIT", 5),
            attachment_window: dur_env("RL_ATTACHMENT_WINDOW", 3600),
        }
    }
}

/// High level guard used by handlers, keyed by the authenticated subject.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self { Self { limiter, cfg } }
    pub fn allow_report(&self, subject: i64) -> bool { self.limiter.check(&format!("report:{subject}"), self.cfg.report_limit, self.cfg.report_window) }
    pub fn allow_comment(&self, subject: i64) -> bool { self.limiter.check(&format!("comment:{subject}"), self.cfg.comment_limit, self.cfg.comment_window) }
    pub fn allow_attachment(&self, subject: i64) -> bool { self.limiter.check(&format!("attachment:{subject}"), self.cfg.attachment_limit, self.cfg.attachment_window) }
}
