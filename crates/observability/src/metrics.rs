//! Prometheus metrics infrastructure
//!
//! This module initializes the Prometheus exporter and provides the metric
//! sets used by the gateway: upstream calls, the surface cache and the HTTP
//! surface endpoint.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Initialize the Prometheus metrics exporter
///
/// This starts an HTTP listener on the specified port that exposes metrics
/// at the `/metrics` endpoint.
///
/// ```ignore
/// observability::metrics::init_metrics(9187)?;
/// // Metrics available at http://localhost:9187/metrics
/// ```
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    tracing::info!(%addr, "Metrics server listening");
    Ok(())
}

/// Metrics for calls against the reference-data upstream
///
/// * `upstream_calls_total{upstream, outcome}` - logical fetch calls by outcome
/// * `upstream_requests_total{upstream}` - physical batch requests incl. retries
/// * `upstream_retries_total{upstream}` - batches retried after a transient failure
/// * `upstream_call_duration_seconds{upstream}` - logical call latency
/// * `upstream_tickers_requested_total{upstream}` - tickers requested
#[derive(Clone)]
pub struct UpstreamMetrics {
    upstream: String,
    requests_total: Counter,
    retries_total: Counter,
    call_duration: Histogram,
    tickers_requested: Counter,
}

impl UpstreamMetrics {
    pub fn new(upstream: &str) -> Self {
        let name = upstream.to_string();

        Self {
            requests_total: counter!("upstream_requests_total", "upstream" => name.clone()),
            retries_total: counter!("upstream_retries_total", "upstream" => name.clone()),
            call_duration: histogram!("upstream_call_duration_seconds", "upstream" => name.clone()),
            tickers_requested: counter!("upstream_tickers_requested_total", "upstream" => name.clone()),
            upstream: name,
        }
    }

    /// Record a completed logical call
    ///
    /// `outcome` is one of success, partial, timeout, error.
    pub fn record_call(&self, duration: Duration, tickers: usize, outcome: &'static str) {
        counter!("upstream_calls_total", "upstream" => self.upstream.clone(), "outcome" => outcome)
            .increment(1);
        self.call_duration.record(duration.as_secs_f64());
        self.tickers_requested.increment(tickers as u64);
    }

    /// Record one physical request to the upstream
    pub fn record_request(&self) {
        self.requests_total.increment(1);
    }

    pub fn record_retry(&self) {
        self.retries_total.increment(1);
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }
}

/// Metrics for the surface cache
///
/// * `surface_cache_lookups_total{result}` - hit, miss, stale, coalesced
/// * `surface_cache_entries` - entries currently held
/// * `surface_cache_evictions_total` - entries removed by expiry or invalidation
#[derive(Clone)]
pub struct CacheMetrics {
    hits: Counter,
    misses: Counter,
    stale: Counter,
    coalesced: Counter,
    entries: Gauge,
    evictions: Counter,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self {
            hits: counter!("surface_cache_lookups_total", "result" => "hit"),
            misses: counter!("surface_cache_lookups_total", "result" => "miss"),
            stale: counter!("surface_cache_lookups_total", "result" => "stale"),
            coalesced: counter!("surface_cache_lookups_total", "result" => "coalesced"),
            entries: gauge!("surface_cache_entries"),
            evictions: counter!("surface_cache_evictions_total"),
        }
    }

    pub fn hit(&self) {
        self.hits.increment(1);
    }

    pub fn miss(&self) {
        self.misses.increment(1);
    }

    pub fn stale(&self) {
        self.stale.increment(1);
    }

    pub fn coalesced(&self) {
        self.coalesced.increment(1);
    }

    pub fn set_entries(&self, count: usize) {
        self.entries.set(count as f64);
    }

    pub fn evicted(&self, count: usize) {
        self.evictions.increment(count as u64);
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics for the HTTP API
///
/// * `http_requests_total{route}` - total requests per route
/// * `http_requests_by_status{route, status}`
/// * `http_request_duration_seconds{route}`
#[derive(Clone)]
pub struct HttpMetrics {
    route: String,
    requests_total: Counter,
    request_duration: Histogram,
}

impl HttpMetrics {
    pub fn new(route: &str) -> Self {
        let route = route.to_string();

        Self {
            requests_total: counter!("http_requests_total", "route" => route.clone()),
            request_duration: histogram!("http_request_duration_seconds", "route" => route.clone()),
            route,
        }
    }

    pub fn record_request(&self, duration: Duration, status_code: u16) {
        self.requests_total.increment(1);
        counter!(
            "http_requests_by_status",
            "route" => self.route.clone(),
            "status" => status_code.to_string()
        )
        .increment(1);
        self.request_duration.record(duration.as_secs_f64());
    }

    pub fn route(&self) -> &str {
        &self.route
    }
}

/// Request metrics guard that records duration on drop
///
/// ```ignore
/// let metrics = HttpMetrics::new("surface");
/// {
///     let mut guard = RequestMetricsGuard::new(&metrics);
///     // ... handle request ...
///     guard.set_status(502);
/// }
/// ```
pub struct RequestMetricsGuard<'a> {
    metrics: &'a HttpMetrics,
    start: std::time::Instant,
    status_code: u16,
}

impl<'a> RequestMetricsGuard<'a> {
    pub fn new(metrics: &'a HttpMetrics) -> Self {
        Self {
            metrics,
            start: std::time::Instant::now(),
            status_code: 200,
        }
    }

    /// Set the status code (call before drop)
    pub fn set_status(&mut self, code: u16) {
        self.status_code = code;
    }
}

impl Drop for RequestMetricsGuard<'_> {
    fn drop(&mut self) {
        self.metrics.record_request(self.start.elapsed(), self.status_code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_sets_without_recorder() {
        // No recorder installed: every handle is a no-op
        let upstream = UpstreamMetrics::new("static");
        upstream.record_request();
        upstream.record_call(Duration::from_millis(12), 5, "success");
        assert_eq!(upstream.upstream(), "static");

        let cache = CacheMetrics::new();
        cache.hit();
        cache.set_entries(3);

        let http = HttpMetrics::new("surface");
        {
            let mut guard = RequestMetricsGuard::new(&http);
            guard.set_status(504);
        }
        assert_eq!(http.route(), "surface");
    }
}
