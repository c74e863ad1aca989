// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-key token-bucket admission control.
//!
//! Buckets refill *intervally*: the whole capacity comes back once per
//! interval, aligned to the bucket's creation time, rather than one token at
//! a time. Buckets are created lazily on first access and kept in memory for
//! the life of the process.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Endpoint classes with independent limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitClass {
    Auth,
    Api,
    Admin,
    Upload,
    Public,
}

impl RateLimitClass {
    pub const ALL: [RateLimitClass; 5] = [
        RateLimitClass::Auth,
        RateLimitClass::Api,
        RateLimitClass::Admin,
        RateLimitClass::Upload,
        RateLimitClass::Public,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RateLimitClass::Auth => "AUTH",
            RateLimitClass::Api => "API",
            RateLimitClass::Admin => "ADMIN",
            RateLimitClass::Upload => "UPLOAD",
            RateLimitClass::Public => "PUBLIC",
        }
    }

    /// Environment variable overriding this class's limit.
    pub fn env_var(&self) -> &'static str {
        match self {
            RateLimitClass::Auth => "RATE_LIMIT_AUTH",
            RateLimitClass::Api => "RATE_LIMIT_API",
            RateLimitClass::Admin => "RATE_LIMIT_ADMIN",
            RateLimitClass::Upload => "RATE_LIMIT_UPLOAD",
            RateLimitClass::Public => "RATE_LIMIT_PUBLIC",
        }
    }

    fn default_limit(&self) -> BucketLimit {
        let (capacity, secs) = match self {
            RateLimitClass::Auth => (5, 60),
            RateLimitClass::Api => (100, 60),
            RateLimitClass::Admin => (50, 60),
            RateLimitClass::Upload => (10, 5 * 60),
            RateLimitClass::Public => (200, 60),
        };
        BucketLimit {
            capacity,
            interval: Duration::from_secs(secs),
        }
    }

    fn index(&self) -> usize {
        match self {
            RateLimitClass::Auth => 0,
            RateLimitClass::Api => 1,
            RateLimitClass::Admin => 2,
            RateLimitClass::Upload => 3,
            RateLimitClass::Public => 4,
        }
    }

    /// Classify a request path by prefix.
    pub fn for_path(path: &str) -> Self {
        if path.starts_with("/api/auth/") {
            RateLimitClass::Auth
        } else if path == "/admin" || path.starts_with("/admin/") {
            RateLimitClass::Admin
        } else if path.starts_with("/items") && path.contains("/image") {
            RateLimitClass::Upload
        } else if path.starts_with("/uploads/") || path.starts_with("/static/") {
            RateLimitClass::Public
        } else {
            RateLimitClass::Api
        }
    }
}

/// Paths never subject to rate limiting.
const EXEMPT_PATHS: [&str; 3] = ["/health", "/actuator/health", "/actuator/info"];

/// Health-check paths, and anything nested under them, bypass the limiter
/// entirely.
pub fn is_exempt(path: &str) -> bool {
    EXEMPT_PATHS.iter().any(|exempt| {
        path.strip_prefix(exempt)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}

/// Capacity and refill interval for one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketLimit {
    pub capacity: u64,
    pub interval: Duration,
}

/// Fixed per-class limits, set once from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitTable {
    limits: [BucketLimit; 5],
}

impl Default for RateLimitTable {
    fn default() -> Self {
        Self {
            limits: RateLimitClass::ALL.map(|class| class.default_limit()),
        }
    }
}

impl RateLimitTable {
    pub fn get(&self, class: RateLimitClass) -> BucketLimit {
        self.limits[class.index()]
    }

    pub fn set(&mut self, class: RateLimitClass, capacity: u64, interval: Duration) {
        self.limits[class.index()] = BucketLimit { capacity, interval };
    }
}

/// Result of a consumption attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumptionProbe {
    pub allowed: bool,
    pub remaining_tokens: u64,
    /// Time until the next refill; zero when the request was admitted.
    pub nanos_to_next_refill: u64,
}

impl ConsumptionProbe {
    /// Whole seconds to wait, truncated.
    pub fn retry_after_secs(&self) -> u64 {
        self.nanos_to_next_refill / 1_000_000_000
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: u64,
    next_refill: Instant,
}

/// A single token bucket. The limit is fixed at creation.
#[derive(Debug)]
pub struct Bucket {
    class: RateLimitClass,
    limit: BucketLimit,
    state: Mutex<BucketState>,
}

impl Bucket {
    fn new(class: RateLimitClass, limit: BucketLimit, now: Instant) -> Self {
        Self {
            class,
            limit,
            state: Mutex::new(BucketState {
                tokens: limit.capacity,
                next_refill: now + limit.interval,
            }),
        }
    }

    pub fn class(&self) -> RateLimitClass {
        self.class
    }

    pub fn limit(&self) -> BucketLimit {
        self.limit
    }

    pub fn try_consume(&self) -> ConsumptionProbe {
        self.try_consume_at(Instant::now())
    }

    /// Take one token if available, refilling to full capacity first if one
    /// or more interval boundaries have passed.
    pub fn try_consume_at(&self, now: Instant) -> ConsumptionProbe {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if now >= state.next_refill {
            let interval_nanos = self.limit.interval.as_nanos().max(1);
            let elapsed_nanos = (now - state.next_refill).as_nanos();
            let periods = elapsed_nanos / interval_nanos + 1;
            let skip = u64::try_from(periods * interval_nanos).unwrap_or(u64::MAX);
            state.next_refill += Duration::from_nanos(skip);
            state.tokens = self.limit.capacity;
        }

        if state.tokens > 0 {
            state.tokens -= 1;
            ConsumptionProbe {
                allowed: true,
                remaining_tokens: state.tokens,
                nanos_to_next_refill: 0,
            }
        } else {
            let wait = state.next_refill.saturating_duration_since(now);
            ConsumptionProbe {
                allowed: false,
                remaining_tokens: 0,
                nanos_to_next_refill: u64::try_from(wait.as_nanos()).unwrap_or(u64::MAX),
            }
        }
    }
}

/// Per-class limit snapshot for the admin stats endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub capacity: u64,
    pub refill_duration_seconds: u64,
}

/// Shared bucket registry.
///
/// Constructed once at startup and shared through `AppState`.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<String, Arc<Bucket>>,
    table: RateLimitTable,
}

impl RateLimiter {
    pub fn new(table: RateLimitTable) -> Self {
        Self {
            buckets: DashMap::new(),
            table,
        }
    }

    pub fn table(&self) -> &RateLimitTable {
        &self.table
    }

    /// Bucket key for the global stage: `ip:CLASS`.
    pub fn bucket_key(client_ip: &str, class: RateLimitClass) -> String {
        format!("{}:{}", client_ip, class.name())
    }

    /// Bucket key for a per-route limit: `ip:route:CLASS`.
    pub fn route_key(client_ip: &str, route: &str, class: RateLimitClass) -> String {
        format!("{}:{}:{}", client_ip, route, class.name())
    }

    /// Return the bucket for `key`, creating it sized for `class` if absent.
    ///
    /// Creation happens under the map's shard lock, so concurrent first
    /// access yields exactly one bucket. An existing bucket keeps the class it
    /// was created with.
    pub fn resolve_bucket(&self, key: &str, class: RateLimitClass) -> Arc<Bucket> {
        if let Some(bucket) = self.buckets.get(key) {
            return bucket.clone();
        }
        let limit = self.table.get(class);
        self.buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Bucket::new(class, limit, Instant::now())))
            .clone()
    }

    pub fn clear(&self, key: &str) {
        self.buckets.remove(key);
    }

    /// Clear the global-stage buckets of one client across every class.
    pub fn clear_client(&self, client_ip: &str) {
        for class in RateLimitClass::ALL {
            self.clear(&Self::bucket_key(client_ip, class));
        }
    }

    pub fn clear_all(&self) {
        self.buckets.clear();
    }

    pub fn active_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Configured limits keyed by class name.
    pub fn class_info(&self) -> std::collections::BTreeMap<&'static str, ClassInfo> {
        RateLimitClass::ALL
            .iter()
            .map(|class| {
                let limit = self.table.get(*class);
                (
                    class.name(),
                    ClassInfo {
                        capacity: limit.capacity,
                        refill_duration_seconds: limit.interval.as_secs(),
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(capacity: u64, secs: u64, now: Instant) -> Bucket {
        Bucket::new(
            RateLimitClass::Auth,
            BucketLimit {
                capacity,
                interval: Duration::from_secs(secs),
            },
            now,
        )
    }

    #[test]
    fn test_capacity_then_denied() {
        let start = Instant::now();
        let bucket = bucket(5, 60, start);

        for expected_remaining in (0..5).rev() {
            let probe = bucket.try_consume_at(start + Duration::from_secs(1));
            assert!(probe.allowed);
            assert_eq!(probe.remaining_tokens, expected_remaining);
        }

        let denied = bucket.try_consume_at(start + Duration::from_secs(1));
        assert!(!denied.allowed);
        assert_eq!(denied.remaining_tokens, 0);
        assert_eq!(denied.retry_after_secs(), 59);
    }

    #[test]
    fn test_refills_to_full_capacity_after_interval() {
        let start = Instant::now();
        let bucket = bucket(5, 60, start);
        for _ in 0..5 {
            assert!(bucket.try_consume_at(start).allowed);
        }
        assert!(!bucket.try_consume_at(start + Duration::from_secs(59)).allowed);

        // Whole capacity returns at the boundary, not token by token
        let probe = bucket.try_consume_at(start + Duration::from_secs(60));
        assert!(probe.allowed);
        assert_eq!(probe.remaining_tokens, 4);
    }

    #[test]
    fn test_no_partial_refill_mid_interval() {
        let start = Instant::now();
        let bucket = bucket(5, 60, start);
        for _ in 0..5 {
            bucket.try_consume_at(start);
        }
        let probe = bucket.try_consume_at(start + Duration::from_secs(30));
        assert!(!probe.allowed);
        assert_eq!(probe.retry_after_secs(), 30);
    }

    #[test]
    fn test_refill_aligns_to_creation_after_idle_periods() {
        let start = Instant::now();
        let bucket = bucket(2, 60, start);
        bucket.try_consume_at(start);
        bucket.try_consume_at(start);

        // Idle for several intervals; next boundary is start + 240s
        let later = start + Duration::from_secs(200);
        assert!(bucket.try_consume_at(later).allowed);
        assert!(bucket.try_consume_at(later).allowed);
        let denied = bucket.try_consume_at(later);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_secs(), 40);
    }

    #[test]
    fn test_path_classification() {
        assert_eq!(RateLimitClass::for_path("/api/auth/login"), RateLimitClass::Auth);
        assert_eq!(RateLimitClass::for_path("/admin/users"), RateLimitClass::Admin);
        assert_eq!(RateLimitClass::for_path("/items/42/image"), RateLimitClass::Upload);
        assert_eq!(RateLimitClass::for_path("/uploads/a.png"), RateLimitClass::Public);
        assert_eq!(RateLimitClass::for_path("/static/app.js"), RateLimitClass::Public);
        assert_eq!(RateLimitClass::for_path("/items"), RateLimitClass::Api);
        assert_eq!(RateLimitClass::for_path("/claims/3"), RateLimitClass::Api);
    }

    #[test]
    fn test_health_paths_exempt() {
        assert!(is_exempt("/health"));
        assert!(is_exempt("/actuator/health"));
        assert!(is_exempt("/actuator/info"));
        assert!(is_exempt("/health/live"));
        assert!(!is_exempt("/api/auth/login"));
    }

    #[test]
    fn test_health_lookalikes_are_limited() {
        assert!(!is_exempt("/healthz"));
        assert!(!is_exempt("/health-anything"));
        assert!(!is_exempt("/actuator/healthcheck"));
        assert!(!is_exempt("/actuator/information"));
    }

    #[test]
    fn test_existing_bucket_keeps_original_class() {
        let limiter = RateLimiter::new(RateLimitTable::default());
        let first = limiter.resolve_bucket("10.0.0.1:X", RateLimitClass::Auth);
        let second = limiter.resolve_bucket("10.0.0.1:X", RateLimitClass::Public);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.class(), RateLimitClass::Auth);
        assert_eq!(second.limit().capacity, 5);
    }

    #[test]
    fn test_clear_client_removes_all_classes() {
        let limiter = RateLimiter::new(RateLimitTable::default());
        for class in RateLimitClass::ALL {
            limiter.resolve_bucket(&RateLimiter::bucket_key("10.0.0.1", class), class);
        }
        limiter.resolve_bucket("10.0.0.2:API", RateLimitClass::Api);
        assert_eq!(limiter.active_buckets(), 6);

        limiter.clear_client("10.0.0.1");
        assert_eq!(limiter.active_buckets(), 1);

        limiter.clear_all();
        assert_eq!(limiter.active_buckets(), 0);
    }
}
