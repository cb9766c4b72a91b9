//! Static reference-data client
//!
//! Serves quotes from configuration. Used by the `static` environment and by
//! tests, which can script latency, not-found securities, dropped rows and
//! request failures.

use super::{ReferenceDataClient, ReferenceDataRequest, ReferenceDataRow, RowError, UpstreamError};
use crate::ticker::TickerSpec;
use crate::Result;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Canonical form of a security, or the trimmed input when it is not a
/// volatility ticker
fn canonical(security: &str) -> String {
    TickerSpec::parse(security)
        .map(|spec| spec.ticker())
        .unwrap_or_else(|_| security.trim().to_string())
}

/// Reference-data client backed by an in-memory quote table
///
/// Unknown securities answer with a null value. Only securities registered
/// with [`with_not_found`](Self::with_not_found) answer `BAD_SEC`.
pub struct StaticReferenceDataClient {
    quotes: RwLock<HashMap<String, Option<f64>>>,
    not_found: HashSet<String>,
    latency: Duration,
    slow: HashMap<String, Duration>,
    dropped_once: Mutex<HashSet<String>>,
    failures: Mutex<VecDeque<UpstreamError>>,
    unavailable: AtomicBool,
    calls: AtomicUsize,
    requests: Mutex<Vec<ReferenceDataRequest>>,
}

impl StaticReferenceDataClient {
    pub fn new() -> Self {
        Self {
            quotes: RwLock::new(HashMap::new()),
            not_found: HashSet::new(),
            latency: Duration::ZERO,
            slow: HashMap::new(),
            dropped_once: Mutex::new(HashSet::new()),
            failures: Mutex::new(VecDeque::new()),
            unavailable: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Build from a `security -> value` table, normalizing legacy tickers
    pub fn from_quotes(quotes: &BTreeMap<String, f64>) -> Result<Self> {
        let mut table = HashMap::with_capacity(quotes.len());
        for (security, value) in quotes {
            let spec = TickerSpec::parse(security)?;
            table.insert(spec.ticker(), Some(*value));
        }

        let client = Self::new();
        *client.quotes.write() = table;
        Ok(client)
    }

    pub fn with_quote(self, security: &str, value: f64) -> Self {
        self.set_quote(security, Some(value));
        self
    }

    /// Answer `security` with an explicit null
    pub fn with_null(self, security: &str) -> Self {
        self.set_quote(security, None);
        self
    }

    /// Answer `security` with `BAD_SEC`
    pub fn with_not_found(mut self, security: &str) -> Self {
        self.not_found.insert(canonical(security));
        self
    }

    /// Fixed latency added to every request
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Latency for any request that contains `security`
    pub fn with_slow_security(mut self, security: &str, latency: Duration) -> Self {
        self.slow.insert(canonical(security), latency);
        self
    }

    /// Leave `security` out of the first response that should contain it
    pub fn with_dropped_once(self, security: &str) -> Self {
        self.dropped_once.lock().insert(canonical(security));
        self
    }

    /// Fail the next request with `error`; queued failures are consumed in order
    pub fn with_failure(self, error: UpstreamError) -> Self {
        self.failures.lock().push_back(error);
        self
    }

    /// Fail every request with a connection error
    pub fn with_unavailable(self) -> Self {
        self.set_unavailable(true);
        self
    }

    pub fn set_quote(&self, security: &str, value: Option<f64>) {
        self.quotes.write().insert(canonical(security), value);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of requests received, including failed ones
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in arrival order
    pub fn requests(&self) -> Vec<ReferenceDataRequest> {
        self.requests.lock().clone()
    }

    pub fn quote_count(&self) -> usize {
        self.quotes.read().len()
    }

    fn delay_for(&self, securities: &[String]) -> Duration {
        securities
            .iter()
            .filter_map(|s| self.slow.get(s))
            .copied()
            .fold(self.latency, Duration::max)
    }

    fn answer(&self, security: &str, field: &str) -> ReferenceDataRow {
        if self.not_found.contains(security) {
            return ReferenceDataRow::error(security, field, RowError::security_not_found(security));
        }
        let value = self.quotes.read().get(security).copied().flatten();
        ReferenceDataRow::value(security, field, value)
    }
}

impl Default for StaticReferenceDataClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReferenceDataClient for StaticReferenceDataClient {
    fn name(&self) -> &str {
        "static"
    }

    async fn reference_data(
        &self,
        request: ReferenceDataRequest,
    ) -> std::result::Result<Vec<ReferenceDataRow>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(UpstreamError::Connection(
                "static upstream marked unavailable".to_string(),
            ));
        }
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }

        let securities: Vec<String> = request.securities.iter().map(|s| canonical(s)).collect();

        let delay = self.delay_for(&securities);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut rows = Vec::with_capacity(securities.len() * request.fields.len());
        for (requested, security) in request.securities.iter().zip(&securities) {
            if self.dropped_once.lock().remove(security) {
                continue;
            }
            for field in &request.fields {
                let mut row = self.answer(security, field);
                // Echo the caller's spelling, as the bridge does
                row.security = requested.clone();
                rows.push(row);
            }
        }

        Ok(rows)
    }
}
