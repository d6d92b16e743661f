//! # Application State Management
//!
//! Shared state handed to every HTTP request handler through `web::Data<AppState>`.
//!
//! ## Ownership:
//! - **config**: read-only after startup, shared through an `Arc`
//! - **simplifier**: the single explanation pipeline (and therefore the single cache)
//!   for the whole process. Created in `main`, torn down when the server stops
//! - **metrics**: per-endpoint request metrics behind `Arc<RwLock<T>>`, written by the
//!   metrics middleware on every request
//!
//! `AppState` itself is cheap to clone: every field is an `Arc` or `Copy`.

use crate::config::AppConfig;
use crate::simplifier::{ExplanationClient, ExplanationService};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    /// The request-to-explanation pipeline, including the process-wide cache
    pub simplifier: Arc<ExplanationService>,

    /// Performance metrics (constantly being updated by requests)
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// HTTP metrics collected across all requests.
///
/// - **request_count**: Total requests processed (for load monitoring)
/// - **error_count**: Total 4xx/5xx responses (for reliability monitoring)
/// - **endpoint_metrics**: Per-endpoint statistics, keyed by e.g. "POST /explain"
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    /// Number of requests to this specific endpoint
    pub request_count: u64,

    /// Total time spent processing all requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    /// Number of error responses for this endpoint
    pub error_count: u64,
}

impl AppState {
    /// Build the state and the explanation pipeline around the given upstream client.
    pub fn new(config: AppConfig, client: Arc<dyn ExplanationClient>) -> Self {
        let simplifier = ExplanationService::new(&config, client);

        Self {
            config: Arc::new(config),
            simplifier: Arc::new(simplifier),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    ///
    /// The first time we see an endpoint, we create a new EndpointMetric with default values.
    /// Subsequent requests update the existing metrics for that endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    ///
    /// Clones the data so we don't hold the lock while serializing the HTTP response.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Release process-wide resources. Returns the number of cached explanations dropped.
    pub fn shutdown(&self) -> usize {
        self.simplifier.clear_cache()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate as a fraction (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simplifier::testing::StubClient;

    #[test]
    fn test_endpoint_metrics() {
        let state = AppState::new(AppConfig::default(), Arc::new(StubClient::new()));
        state.record_endpoint_request("POST /explain", 100, false);
        state.record_endpoint_request("POST /explain", 300, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["POST /explain"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 200.0);
        assert_eq!(metric.error_rate(), 0.5);
    }

    #[test]
    fn test_empty_metric_rates() {
        let metric = EndpointMetric::default();
        assert_eq!(metric.average_duration_ms(), 0.0);
        assert_eq!(metric.error_rate(), 0.0);
    }
}
