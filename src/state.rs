//! # Application State Management
//!
//! This module holds everything HTTP handlers share: the loaded configuration,
//! the two domain services (session start and answer turns) and the service
//! counters read by `/health` and `/metrics`.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: lets every worker thread hold the same services and counters
//! - **Memory safety**: the data is dropped when the last reference goes away
//!
//! ### RwLock (Reader-Writer Lock)
//! - **Purpose**: many readers OR one writer at a time
//! - **Used for**: metrics, which every request updates
//!
//! The services themselves need no lock: each one is immutable after
//! construction and keeps its own synchronization (the session store).

use crate::config::AppConfig;
use crate::pipeline::TurnPipeline;
use crate::session::SessionLifecycle;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Instant;

/// The state shared across all HTTP request handlers.
///
/// ## Rust Concepts:
/// - **#[derive(Clone)]**: cloning copies the `Arc`s, not the data behind them
/// - **Instant**: when the server started, used for uptime
#[derive(Clone)]
pub struct AppState {
    /// Loaded once at startup; never changes afterwards
    pub config: Arc<AppConfig>,

    /// Issues new sessions (`GET /chat/start`)
    pub lifecycle: Arc<SessionLifecycle>,

    /// Runs answer turns (`POST /chat/answer`)
    pub pipeline: Arc<TurnPipeline>,

    /// Name of the configured session store, reported by `/health`
    pub store_backend: &'static str,

    /// Request and domain counters, updated by middleware and handlers
    pub metrics: Arc<RwLock<AppMetrics>>,

    pub start_time: Instant,
}

/// Counters collected since server start.
///
/// ## Why these metrics matter:
/// - **request_count / error_count**: load and reliability
/// - **sessions_started / turns_completed / turns_failed**: interview traffic
/// - **persistence_inconsistencies**: turns whose reply was delivered but
///   whose history write failed; the session is behind what the client saw
/// - **endpoint_metrics**: per-route latency and error rate
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub sessions_started: u64,
    pub turns_completed: u64,
    pub turns_failed: u64,
    pub persistence_inconsistencies: u64,

    /// Key: method plus route pattern (e.g., "POST /chat/answer")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance metrics for a single route.
///
/// ## Performance calculations:
/// - **Average response time**: total_duration_ms / request_count
/// - **Error rate**: error_count / request_count
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    /// Create the shared state from the already-built services.
    pub fn new(
        config: AppConfig,
        lifecycle: Arc<SessionLifecycle>,
        pipeline: Arc<TurnPipeline>,
        store_backend: &'static str,
    ) -> Self {
        Self {
            config: Arc::new(config),
            lifecycle,
            pipeline,
            store_backend,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    // Counters stay usable even if a panicking thread poisoned the lock
    fn metrics_mut(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        self.metrics_mut().request_count += 1;
    }

    /// Increment the total error counter (any 4xx or 5xx response).
    pub fn increment_error_count(&self) {
        self.metrics_mut().error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    ///
    /// ## HashMap operations:
    /// The first time we see an endpoint, `.entry().or_default()` creates a
    /// zeroed [`EndpointMetric`]; later requests update it in place.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_mut();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    pub fn record_session_started(&self) {
        self.metrics_mut().sessions_started += 1;
    }

    /// Record a finished turn.
    ///
    /// `persisted == false` means the client got a reply the store never saw.
    pub fn record_turn_completed(&self, persisted: bool) {
        let mut metrics = self.metrics_mut();
        metrics.turns_completed += 1;
        if !persisted {
            metrics.persistence_inconsistencies += 1;
        }
    }

    pub fn record_turn_failed(&self) {
        self.metrics_mut().turns_failed += 1;
    }

    /// Get a snapshot of current metrics (used for `/health` and `/metrics`).
    ///
    /// Cloning releases the lock before the response is serialized.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl AppMetrics {
    /// Overall error rate (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        ratio(self.error_count, self.request_count)
    }
}

impl EndpointMetric {
    /// Average = Total Duration ÷ Number of Requests
    pub fn average_duration_ms(&self) -> f64 {
        ratio(self.total_duration_ms, self.request_count)
    }

    /// Error rate for this endpoint (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        ratio(self.error_count, self.request_count)
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}
