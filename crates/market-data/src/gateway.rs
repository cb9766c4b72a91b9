//! Market data gateway
//!
//! Issues reference-data requests for a set of tickers against the upstream:
//! splits them into batches, bounds concurrency with a gateway-wide
//! semaphore, applies a per-request timeout and retries transient failures
//! exactly once.

use crate::error::MarketDataError;
use crate::ticker::TickerSpec;
use crate::types::QuoteField;
use crate::upstream::{ReferenceDataClient, ReferenceDataRequest, ReferenceDataRow, UpstreamError};
use crate::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use observability::UpstreamMetrics;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Gateway tuning
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Per-request timeout
    pub timeout: Duration,
    pub max_batch_size: usize,
    /// Upstream requests in flight across the whole gateway
    pub max_concurrency: usize,
    pub retry_backoff: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(config::default_timeout_ms()),
            max_batch_size: config::default_max_batch_size(),
            max_concurrency: config::default_max_concurrency(),
            retry_backoff: Duration::from_millis(config::default_retry_backoff_ms()),
        }
    }
}

impl From<&config::UpstreamConfig> for GatewayConfig {
    fn from(upstream: &config::UpstreamConfig) -> Self {
        Self {
            timeout: Duration::from_millis(upstream.timeout_ms),
            max_batch_size: upstream.max_batch_size.max(1),
            max_concurrency: upstream.max_concurrency.max(1),
            retry_backoff: Duration::from_millis(upstream.retry_backoff_ms),
        }
    }
}

/// Why a ticker produced no quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Request timed out, including the retry
    Timeout,
    /// Upstream answered `BAD_SEC`
    NotFound,
    /// Connection error or transient HTTP status, including the retry
    Unavailable,
    /// Non-transient rejection of the request
    Rejected,
    /// Ticker absent from the response, including the retry
    Missing,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::NotFound => "not_found",
            FailureKind::Unavailable => "unavailable",
            FailureKind::Rejected => "rejected",
            FailureKind::Missing => "missing",
        }
    }

    /// Failure of the request as a whole rather than an answer about the ticker
    pub fn is_request_level(&self) -> bool {
        matches!(
            self,
            FailureKind::Timeout | FailureKind::Unavailable | FailureKind::Rejected
        )
    }
}

impl From<&UpstreamError> for FailureKind {
    fn from(error: &UpstreamError) -> Self {
        match error {
            UpstreamError::Timeout => FailureKind::Timeout,
            UpstreamError::Connection(_) => FailureKind::Unavailable,
            UpstreamError::Status { .. } if error.is_transient() => FailureKind::Unavailable,
            UpstreamError::Status { .. } | UpstreamError::Decode(_) => FailureKind::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickerFailure {
    pub spec: TickerSpec,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome label for one logical call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Success,
    Partial,
    Timeout,
    Error,
}

impl FetchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchOutcome::Success => "success",
            FetchOutcome::Partial => "partial",
            FetchOutcome::Timeout => "timeout",
            FetchOutcome::Error => "error",
        }
    }
}

/// Quotes and per-ticker failures from one logical call
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub correlation_id: Uuid,
    pub quotes: Vec<QuoteField>,
    pub failures: Vec<TickerFailure>,
    pub elapsed: Duration,
}

impl FetchResult {
    pub fn quote(&self, spec: &TickerSpec, field: &str) -> Option<&QuoteField> {
        self.quotes
            .iter()
            .find(|q| &q.spec == spec && q.field == field)
    }

    /// Value of the first field for `spec`; `None` for null or failed tickers
    pub fn value(&self, spec: &TickerSpec) -> Option<f64> {
        self.quotes.iter().find(|q| &q.spec == spec)?.value
    }

    pub fn failure(&self, spec: &TickerSpec) -> Option<&TickerFailure> {
        self.failures.iter().find(|f| &f.spec == spec)
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn outcome(&self) -> FetchOutcome {
        if self.failures.is_empty() {
            FetchOutcome::Success
        } else {
            FetchOutcome::Partial
        }
    }

    /// All quotes, or `PartialFailure` if any ticker failed
    pub fn into_complete(self) -> Result<Vec<QuoteField>> {
        if self.failures.is_empty() {
            Ok(self.quotes)
        } else {
            let total = self.quotes.len() + self.failures.len();
            Err(MarketDataError::PartialFailure {
                failed: self.failures,
                total,
            })
        }
    }
}

#[derive(Default)]
struct BatchResult {
    quotes: Vec<QuoteField>,
    failures: Vec<TickerFailure>,
}

enum TickerRows {
    Quotes(Vec<QuoteField>),
    NotFound(String),
    Missing,
}

/// Reference-data gateway shared by every surface request
pub struct MarketDataGateway {
    client: Arc<dyn ReferenceDataClient>,
    config: GatewayConfig,
    semaphore: Arc<Semaphore>,
    metrics: UpstreamMetrics,
}

impl MarketDataGateway {
    pub fn new(client: Arc<dyn ReferenceDataClient>, config: GatewayConfig) -> Self {
        let metrics = UpstreamMetrics::new(client.name());
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            client,
            config,
            semaphore,
            metrics,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn upstream_name(&self) -> &str {
        self.client.name()
    }

    /// Permits currently free
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Fetch `fields` for every security
    ///
    /// Returns `Timeout` when every ticker timed out and `UpstreamUnavailable`
    /// when every ticker failed at the request level. Anything else,
    /// including a mix of quotes and failures, is an `Ok(FetchResult)`.
    pub async fn fetch(&self, securities: &[TickerSpec], fields: &[String]) -> Result<FetchResult> {
        let correlation_id = Uuid::new_v4();
        let start = Instant::now();

        let mut seen = HashSet::new();
        let specs: Vec<TickerSpec> = securities
            .iter()
            .filter(|s| seen.insert((*s).clone()))
            .cloned()
            .collect();
        let total = specs.len();

        if specs.is_empty() || fields.is_empty() {
            return Ok(FetchResult {
                correlation_id,
                quotes: Vec::new(),
                failures: Vec::new(),
                elapsed: start.elapsed(),
            });
        }

        let batches: Vec<Vec<TickerSpec>> = specs
            .chunks(self.config.max_batch_size.max(1))
            .map(<[TickerSpec]>::to_vec)
            .collect();
        let batch_count = batches.len();

        let results: Vec<BatchResult> = stream::iter(batches)
            .map(|batch| self.fetch_batch(batch, fields, correlation_id))
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let mut quotes = Vec::with_capacity(total * fields.len());
        let mut failures = Vec::new();
        for result in results {
            quotes.extend(result.quotes);
            failures.extend(result.failures);
        }

        let elapsed = start.elapsed();
        let whole_call_failed = quotes.is_empty()
            && !failures.is_empty()
            && failures.iter().all(|f| f.kind.is_request_level());

        if whole_call_failed {
            let all_timed_out = failures.iter().all(|f| f.kind == FailureKind::Timeout);
            let outcome = if all_timed_out {
                FetchOutcome::Timeout
            } else {
                FetchOutcome::Error
            };
            self.metrics.record_call(elapsed, total, outcome.as_str());

            warn!(
                correlation_id = %correlation_id,
                upstream = self.client.name(),
                tickers = total,
                batches = batch_count,
                elapsed_ms = elapsed.as_millis() as u64,
                outcome = outcome.as_str(),
                "Reference data call failed"
            );

            return Err(if all_timed_out {
                MarketDataError::Timeout {
                    tickers: failures.iter().map(|f| f.spec.ticker()).collect(),
                }
            } else {
                let reason = failures
                    .iter()
                    .find(|f| f.kind != FailureKind::Timeout)
                    .map(|f| f.message.clone())
                    .unwrap_or_default();
                MarketDataError::unavailable(reason)
            });
        }

        let result = FetchResult {
            correlation_id,
            quotes,
            failures,
            elapsed,
        };
        let outcome = result.outcome();
        self.metrics.record_call(elapsed, total, outcome.as_str());

        info!(
            correlation_id = %correlation_id,
            upstream = self.client.name(),
            tickers = total,
            batches = batch_count,
            failed = result.failures.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            outcome = outcome.as_str(),
            "Reference data call completed"
        );

        Ok(result)
    }

    async fn fetch_batch(
        &self,
        batch: Vec<TickerSpec>,
        fields: &[String],
        correlation_id: Uuid,
    ) -> BatchResult {
        let mut result = BatchResult::default();
        let mut pending = batch;

        for attempt in 0..2 {
            let last = attempt == 1;
            if last {
                self.metrics.record_retry();
                debug!(
                    correlation_id = %correlation_id,
                    tickers = pending.len(),
                    backoff_ms = self.config.retry_backoff.as_millis() as u64,
                    "Retrying reference data batch"
                );
                tokio::time::sleep(self.config.retry_backoff).await;
            }

            let mut retry = Vec::new();
            match self.call(&pending, fields).await {
                Ok(rows) => {
                    let index = index_rows(&rows);
                    for spec in pending {
                        match rows_for(&spec, fields, &index) {
                            TickerRows::Quotes(quotes) => result.quotes.extend(quotes),
                            TickerRows::NotFound(message) => result.failures.push(TickerFailure {
                                spec,
                                kind: FailureKind::NotFound,
                                message,
                            }),
                            TickerRows::Missing if last => result.failures.push(TickerFailure {
                                message: format!("{} absent from upstream response", spec.ticker()),
                                spec,
                                kind: FailureKind::Missing,
                            }),
                            TickerRows::Missing => retry.push(spec),
                        }
                    }
                }
                Err(e) if e.is_transient() && !last => {
                    debug!(correlation_id = %correlation_id, error = %e, "Transient upstream failure");
                    retry = pending;
                }
                Err(e) => {
                    let kind = FailureKind::from(&e);
                    let message = e.to_string();
                    result
                        .failures
                        .extend(pending.into_iter().map(|spec| TickerFailure {
                            spec,
                            kind,
                            message: message.clone(),
                        }));
                }
            }

            pending = retry;
            if pending.is_empty() {
                break;
            }
        }

        result
    }

    /// One physical upstream request under the semaphore and timeout
    async fn call(
        &self,
        specs: &[TickerSpec],
        fields: &[String],
    ) -> std::result::Result<Vec<ReferenceDataRow>, UpstreamError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| UpstreamError::Connection("gateway is shut down".to_string()))?;

        self.metrics.record_request();
        let request = ReferenceDataRequest::new(
            specs.iter().map(TickerSpec::ticker).collect(),
            fields.to_vec(),
        );

        match tokio::time::timeout(self.config.timeout, self.client.reference_data(request)).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout),
        }
    }
}

/// Rows keyed by canonical ticker and field
fn index_rows(rows: &[ReferenceDataRow]) -> HashMap<(String, &str), &ReferenceDataRow> {
    rows.iter()
        .map(|row| {
            let security = TickerSpec::parse(&row.security)
                .map(|spec| spec.ticker())
                .unwrap_or_else(|_| row.security.trim().to_string());
            ((security, row.field.as_str()), row)
        })
        .collect()
}

fn rows_for(
    spec: &TickerSpec,
    fields: &[String],
    index: &HashMap<(String, &str), &ReferenceDataRow>,
) -> TickerRows {
    let ticker = spec.ticker();
    let as_of = Utc::now();
    let mut quotes = Vec::with_capacity(fields.len());

    for field in fields {
        let Some(row) = index.get(&(ticker.clone(), field.as_str())) else {
            return TickerRows::Missing;
        };

        let value = match &row.error {
            Some(error) if error.is_security_not_found() => {
                return TickerRows::NotFound(format!("{}: {}", error.category, error.message));
            }
            Some(error) => {
                debug!(ticker = %ticker, field = %field, category = %error.category, "Field-level upstream error");
                None
            }
            None => row.value,
        };

        quotes.push(QuoteField {
            spec: spec.clone(),
            ticker: ticker.clone(),
            field: field.clone(),
            value,
            as_of,
        });
    }

    TickerRows::Quotes(quotes)
}
