//! Metrics definitions for the session controller.
//!
//! All metrics follow Prometheus naming conventions:
//! - `p2p_` prefix
//! - `_total` suffix for counters
//!
//! # Cardinality
//!
//! - `role`: 2 values (host, guest)
//! - `outcome`: 6 values (`success` plus each `SessionError::kind`)
//! - `origin`: 4 values (snapshot, event, conversation, push)

use metrics::{counter, gauge};

/// Record a join attempt.
///
/// Metric: `p2p_session_joins_total`
/// Labels: `role`, `outcome` (`success` or a `SessionError::kind` value)
pub fn record_join(role: &'static str, outcome: &'static str) {
    counter!("p2p_session_joins_total", "role" => role, "outcome" => outcome).increment(1);
}

/// Record one subscribe issued.
///
/// Metric: `p2p_subscriptions_total`
/// Labels: `origin` (snapshot, event, conversation, push)
pub fn record_subscription(origin: &'static str) {
    counter!("p2p_subscriptions_total", "origin" => origin).increment(1);
}

/// Record a subscription completion discarded because its session is gone.
///
/// Metric: `p2p_stale_completions_total`
pub fn record_stale_completion() {
    counter!("p2p_stale_completions_total").increment(1);
}

/// A session reached the joined state.
///
/// Metric: `p2p_sessions_active`
pub fn session_opened() {
    gauge!("p2p_sessions_active").increment(1.0);
}

/// A joined session was left.
///
/// Metric: `p2p_sessions_active`
pub fn session_closed() {
    gauge!("p2p_sessions_active").decrement(1.0);
}
