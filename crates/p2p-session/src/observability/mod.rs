//! Observability for the session controller.
//!
//! # Privacy by Default
//!
//! Actor handlers use `#[instrument(skip_all)]` and only allow-listed fields
//! (room name, role, publication id, member id). The room credential is never
//! logged.
//!
//! # Tracing targets
//!
//! | Target | Emitted by |
//! |--------|------------|
//! | `p2p.session.actor` | session actor lifecycle, join/leave/start |
//! | `p2p.session.events` | room and local member events |
//! | `p2p.session.stream` | remote slot routing |
//! | `p2p.session.media` | local media acquisition |
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `p2p_session_joins_total` | Counter | `role`, `outcome` | Join attempts |
//! | `p2p_subscriptions_total` | Counter | `origin` | Subscribes issued |
//! | `p2p_stale_completions_total` | Counter | none | Completions discarded after leave |
//! | `p2p_sessions_active` | Gauge | none | Joined sessions in this process |
//!
//! The `metrics` facade is used without a recorder; the embedding
//! application installs one (e.g. a Prometheus exporter).

pub mod metrics;

use common::config::ObservabilityConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use metrics::{
    record_join, record_stale_completion, record_subscription, session_closed, session_opened,
};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` (via [`ObservabilityConfig::log_level`]) selects the filter;
/// `json_logs` switches to JSON lines.
///
/// # Errors
///
/// Returns an error if the filter does not parse or a global subscriber is
/// already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), String> {
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| format!("Invalid log filter '{}': {e}", config.log_level))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|e| format!("Failed to install tracing subscriber: {e}"))
}
