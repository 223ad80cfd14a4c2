use axum::http::HeaderMap;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics::RATE_LIMIT_ENTRIES;

// loopback and the "no IP" fallback never consume quota
pub const BYPASS_IPS: [&str; 4] = ["127.0.0.1", "::1", "localhost", "unknown"];

const DEFAULT_DESCRIPTION: &str = "email submissions";

// Source of "now" so windows can be driven deterministically in tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = add_window(*now, by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// Rate limit entry - tracks accepted requests per identifier
#[derive(Debug, Clone, Copy)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
    pub description: &'static str,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_requests: 3,
            window: Duration::from_secs(60 * 60),
            description: DEFAULT_DESCRIPTION,
        }
    }
}

pub struct RateLimits {
    pub email_signup: RateLimitPolicy,
    pub login_attempt: RateLimitPolicy,
}

pub const RATE_LIMITS: RateLimits = RateLimits {
    email_signup: RateLimitPolicy {
        max_requests: 3,
        window: Duration::from_secs(60 * 60),
        description: "email submissions",
    },
    login_attempt: RateLimitPolicy {
        max_requests: 5,
        window: Duration::from_secs(15 * 60),
        description: "login attempts",
    },
};

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining_requests: u32,
    pub reset_time: DateTime<Utc>,
    pub retry_after_secs: u64,
    pub error: Option<String>,
}

pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    clock: Arc<dyn Clock>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    pub fn check_rate_limit(
        &self,
        identifier: &str,
        max_requests: u32,
        window: Duration,
    ) -> RateLimitResult {
        self.check(
            identifier,
            &RateLimitPolicy {
                max_requests,
                window,
                description: DEFAULT_DESCRIPTION,
            },
        )
    }

    // read-modify-write under the shard lock for this key
    pub fn check(&self, identifier: &str, policy: &RateLimitPolicy) -> RateLimitResult {
        let now = self.clock.now();
        let fresh = RateLimitEntry {
            count: 0,
            reset_time: add_window(now, policy.window),
        };

        match self.entries.entry(identifier.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if now > entry.reset_time {
                    *entry = fresh;
                }
                if entry.count >= policy.max_requests {
                    return rejected(entry.reset_time, now, policy);
                }
                entry.count += 1;
                allowed(entry, now, policy)
            }
            Entry::Vacant(vacant) => {
                if fresh.count >= policy.max_requests {
                    return rejected(fresh.reset_time, now, policy);
                }
                let entry = vacant.insert(RateLimitEntry {
                    count: fresh.count + 1,
                    ..fresh
                });
                allowed(&entry, now, policy)
            }
        }
    }

    // drop lapsed windows, returns how many went
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now <= entry.reset_time);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn allowed(entry: &RateLimitEntry, now: DateTime<Utc>, policy: &RateLimitPolicy) -> RateLimitResult {
    RateLimitResult {
        allowed: true,
        remaining_requests: policy.max_requests.saturating_sub(entry.count),
        reset_time: entry.reset_time,
        retry_after_secs: seconds_until(entry.reset_time, now),
        error: None,
    }
}

fn rejected(reset_time: DateTime<Utc>, now: DateTime<Utc>, policy: &RateLimitPolicy) -> RateLimitResult {
    let minutes = minutes_until(reset_time, now);
    let plural = if minutes == 1 { "" } else { "s" };
    RateLimitResult {
        allowed: false,
        remaining_requests: 0,
        reset_time,
        retry_after_secs: seconds_until(reset_time, now),
        error: Some(format!(
            "Too many {}. Please try again in {} minute{}.",
            policy.description, minutes, plural
        )),
    }
}

fn add_window(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(window)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn millis_until(reset_time: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (reset_time - now).num_milliseconds().max(0) as u64
}

fn minutes_until(reset_time: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    millis_until(reset_time, now).div_ceil(60_000)
}

fn seconds_until(reset_time: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    millis_until(reset_time, now).div_ceil(1_000)
}

pub fn client_ip(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    // x-forwarded-for can hold a chain, the first hop is the client
    if let Some(forwarded) = header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }

    header("x-real-ip")
        .or_else(|| header("cf-connecting-ip"))
        .unwrap_or("unknown")
        .to_string()
}

pub fn should_bypass_rate_limit(ip: &str) -> bool {
    BYPASS_IPS.contains(&ip)
}

// Sweeper - removes expired entries until cancelled
pub fn spawn_sweeper(
    limiter: Arc<RateLimiter>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        // first tick fires immediately, nothing to sweep yet
        ticker.tick().await;

        info!("Rate limit sweeper started (interval: {:?})", every);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = limiter.sweep();
                    RATE_LIMIT_ENTRIES.set(limiter.len() as f64);
                    if removed > 0 {
                        debug!(removed, remaining = limiter.len(), "Swept expired rate limit entries");
                    }
                }
            }
        }

        info!("Rate limit sweeper stopped");
    })
}
