// crates/mcp-server/src/rate_limiter.rs
// ============================================================================
// Module: Rate Limiter
// Description: Token-bucket rate limiting keyed by caller identity and
//              method.
// Purpose: Protect the router from abusive or runaway callers without
//          requiring a shared store (§4.8).
// Dependencies: std
// ============================================================================

//! ## Overview
//! Each `(identity, method)` pair owns an independent token bucket. Buckets
//! are created lazily on first access and refill continuously at a
//! configured rate, so `remaining` and `resetsAt` are always consistent with
//! the bucket state at decision time, even under concurrent checks.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

// ============================================================================
// SECTION: Identity
// ============================================================================

/// The caller identity a rate-limit bucket is keyed on.
///
/// # Invariants
/// - Priority order when deriving from a request: bearer key, then session
///   id, then source IP, then [`Identity::Anonymous`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Identified by a bearer API key (the key itself, not a hash — callers
    /// needing hashed keys in logs should hash at the call site).
    BearerKey(String),
    /// Identified by a session identifier.
    Session(String),
    /// Identified by a source IP address.
    SourceIp(IpAddr),
    /// No stronger identity was available.
    Anonymous,
}

impl Identity {
    /// Derives an identity in priority order: bearer key, session, IP,
    /// anonymous.
    #[must_use]
    pub fn derive(
        bearer_key: Option<&str>,
        session_id: Option<&str>,
        source_ip: Option<IpAddr>,
    ) -> Self {
        if let Some(key) = bearer_key {
            return Self::BearerKey(key.to_string());
        }
        if let Some(session) = session_id {
            return Self::Session(session.to_string());
        }
        if let Some(ip) = source_ip {
            return Self::SourceIp(ip);
        }
        Self::Anonymous
    }

    fn key_fragment(&self) -> String {
        match self {
            Self::BearerKey(key) => format!("bearer:{key}"),
            Self::Session(id) => format!("session:{id}"),
            Self::SourceIp(ip) => format!("ip:{ip}"),
            Self::Anonymous => "anonymous".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Per-method or default token-bucket parameters.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitRule {
    /// Bucket capacity (maximum tokens / burst size).
    pub limit: u64,
    /// How long a fully-drained bucket takes to refill to `limit`.
    pub window: Duration,
}

impl RateLimitRule {
    /// Builds a rule with the given capacity and refill window.
    #[must_use]
    pub const fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window,
        }
    }
}

/// The decision returned by [`RateLimiter::check`].
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// The bucket's configured capacity.
    pub limit: u64,
    /// Tokens remaining after this check (`0` on denial).
    pub remaining: u64,
    /// Unix epoch milliseconds when the bucket is next full.
    pub resets_at_ms: u64,
    /// Suggested retry delay in seconds, present only on denial.
    pub retry_after_secs: Option<u64>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

// ============================================================================
// SECTION: RateLimiter
// ============================================================================

/// Token-bucket rate limiter over `(identity, method)` keys.
///
/// # Invariants
/// - A denial always reports `remaining == 0`.
/// - Bucket count is bounded by periodic eviction of stale entries so an
///   attacker cannot exhaust memory by cycling identities.
pub struct RateLimiter {
    default_rule: RateLimitRule,
    per_method: HashMap<&'static str, RateLimitRule>,
    buckets: Mutex<HashMap<String, Bucket>>,
    max_entries: usize,
}

impl RateLimiter {
    /// Builds a limiter with a default rule and per-method overrides.
    #[must_use]
    pub fn new(
        default_rule: RateLimitRule,
        per_method: HashMap<&'static str, RateLimitRule>,
        max_entries: usize,
    ) -> Self {
        Self {
            default_rule,
            per_method,
            buckets: Mutex::new(HashMap::new()),
            max_entries,
        }
    }

    fn rule_for(&self, method: &str) -> RateLimitRule {
        self.per_method.get(method).copied().unwrap_or(self.default_rule)
    }

    /// Checks and, if allowed, consumes one token for `(identity, method)`.
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned internal mutex is treated as a denial.
    #[must_use]
    pub fn check(&self, identity: &Identity, method: &str) -> RateLimitDecision {
        let rule = self.rule_for(method);
        let key = format!("{}:{}", identity.key_fragment(), method);
        let now = Instant::now();
        let refill_rate = f64::from(u32::try_from(rule.limit).unwrap_or(u32::MAX))
            / rule.window.as_secs_f64().max(0.001);

        let Ok(mut buckets) = self.buckets.lock() else {
            return denied(rule, now, rule.window);
        };

        if buckets.len() > self.max_entries {
            let ttl = rule.window.saturating_mul(4);
            buckets.retain(|_, bucket| now.duration_since(bucket.last_seen) <= ttl);
        }

        let bucket = buckets.entry(key).or_insert_with(|| Bucket {
            tokens: rule.limit as f64,
            last_refill: now,
            last_seen: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * refill_rate).min(rule.limit as f64);
        bucket.last_refill = now;
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            let remaining = bucket.tokens.floor() as u64;
            RateLimitDecision {
                allowed: true,
                limit: rule.limit,
                remaining,
                resets_at_ms: resets_at_ms(rule.limit, bucket.tokens, refill_rate),
                retry_after_secs: None,
            }
        } else {
            let deficit = 1.0 - bucket.tokens;
            let retry_after_secs = (deficit / refill_rate).ceil() as u64;
            RateLimitDecision {
                allowed: false,
                limit: rule.limit,
                remaining: 0,
                resets_at_ms: resets_at_ms(rule.limit, bucket.tokens, refill_rate),
                retry_after_secs: Some(retry_after_secs),
            }
        }
    }
}

fn resets_at_ms(limit: u64, tokens: f64, refill_rate: f64) -> u64 {
    let deficit = (limit as f64 - tokens).max(0.0);
    let secs_to_full = if refill_rate > 0.0 { deficit / refill_rate } else { 0.0 };
    let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    now_ms.saturating_add((secs_to_full * 1000.0) as u128) as u64
}

fn denied(rule: RateLimitRule, _now: Instant, window: Duration) -> RateLimitDecision {
    RateLimitDecision {
        allowed: false,
        limit: rule.limit,
        remaining: 0,
        resets_at_ms: 0,
        retry_after_secs: Some(window.as_secs().max(1)),
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::print_stdout,
        clippy::print_stderr,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        clippy::dbg_macro,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        reason = "Test-only framing assertions."
    )]

    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_denies() {
        let limiter = RateLimiter::new(
            RateLimitRule::new(2, Duration::from_secs(1)),
            HashMap::new(),
            1024,
        );
        let identity = Identity::Anonymous;
        assert!(limiter.check(&identity, "tools/list").allowed);
        assert!(limiter.check(&identity, "tools/list").allowed);
        let third = limiter.check(&identity, "tools/list");
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
        assert!(third.retry_after_secs.is_some());
    }

    #[test]
    fn distinct_methods_have_independent_buckets() {
        let limiter = RateLimiter::new(
            RateLimitRule::new(1, Duration::from_secs(1)),
            HashMap::new(),
            1024,
        );
        let identity = Identity::Anonymous;
        assert!(limiter.check(&identity, "tools/list").allowed);
        assert!(limiter.check(&identity, "resources/list").allowed);
    }

    #[test]
    fn identity_priority_prefers_bearer_over_session_over_ip() {
        let identity =
            Identity::derive(Some("key"), Some("session"), Some("127.0.0.1".parse().unwrap()));
        assert_eq!(identity, Identity::BearerKey("key".to_string()));
        let identity = Identity::derive(None, Some("session"), Some("127.0.0.1".parse().unwrap()));
        assert_eq!(identity, Identity::Session("session".to_string()));
        let identity = Identity::derive(None, None, Some("127.0.0.1".parse().unwrap()));
        assert_eq!(identity, Identity::SourceIp("127.0.0.1".parse().unwrap()));
        assert_eq!(Identity::derive(None, None, None), Identity::Anonymous);
    }
}
