//! Surface coordinator
//!
//! Entry point for surface requests. Each tenor is looked up in the
//! [`SurfaceCache`]; misses resolve the tenor's tickers, fetch them through
//! the [`MarketDataGateway`] in a spawned task and assemble the point.

use crate::assembler::{assemble_point, gap_for_error};
use crate::cache::{CacheKey, CacheStats, EntryState, Lookup, SurfaceCache};
use crate::error::MarketDataError;
use crate::gateway::MarketDataGateway;
use crate::ticker::TickerResolver;
use crate::types::{CurrencyPair, Delta, GapReason, Tenor, TenorOutcome, VolatilitySurface};
use crate::Result;
use futures::future::{join_all, FutureExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Surface assembly settings
#[derive(Debug, Clone)]
pub struct SurfaceSettings {
    pub deltas: Vec<Delta>,
    /// Vendor field requested for every ticker
    pub field: String,
    pub default_tenors: Vec<Tenor>,
    pub default_max_age: Duration,
    /// Deadline applied by the HTTP API when the caller gives none
    pub request_deadline: Option<Duration>,
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl SurfaceSettings {
    pub fn from_config(config: &config::VolGateConfig) -> Result<Self> {
        let deltas = config
            .surface
            .deltas
            .iter()
            .map(|d| Delta::new(*d))
            .collect::<Result<Vec<_>>>()?;
        let default_tenors = config
            .surface
            .default_tenors
            .iter()
            .map(|t| Tenor::parse(t))
            .collect::<Result<Vec<_>>>()?;
        let request_deadline = request_deadline(config.surface.request_deadline_ms);

        Ok(Self {
            deltas,
            field: config.upstream.field.clone(),
            default_tenors,
            default_max_age: Duration::from_secs(config.surface.default_max_age_seconds),
            request_deadline,
            ttl: Duration::from_secs(config.cache.ttl_seconds),
            sweep_interval: Duration::from_secs(config.cache.sweep_interval_seconds.max(1)),
        })
    }
}

fn request_deadline(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self {
            deltas: config::default_deltas()
                .into_iter()
                .filter_map(|d| Delta::new(d).ok())
                .collect(),
            field: config::default_quote_field(),
            default_tenors: config::default_tenors()
                .iter()
                .filter_map(|t| Tenor::parse(t).ok())
                .collect(),
            default_max_age: Duration::from_secs(config::default_max_age_seconds()),
            request_deadline: request_deadline(config::default_request_deadline_ms()),
            ttl: Duration::from_secs(config::default_ttl_seconds()),
            sweep_interval: Duration::from_secs(config::default_sweep_interval_seconds()),
        }
    }
}

/// Cache-fronted surface assembly, cheap to clone
#[derive(Clone)]
pub struct SurfaceCoordinator {
    gateway: Arc<MarketDataGateway>,
    cache: Arc<SurfaceCache>,
    resolver: Arc<TickerResolver>,
    settings: Arc<SurfaceSettings>,
}

impl SurfaceCoordinator {
    pub fn new(gateway: Arc<MarketDataGateway>, settings: SurfaceSettings) -> Self {
        Self {
            cache: Arc::new(SurfaceCache::new(settings.ttl)),
            resolver: Arc::new(TickerResolver::new(settings.deltas.clone())),
            gateway,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &SurfaceSettings {
        &self.settings
    }

    pub fn resolver(&self) -> &TickerResolver {
        &self.resolver
    }

    pub fn gateway(&self) -> &MarketDataGateway {
        &self.gateway
    }

    /// Surface for `pair` without a caller deadline
    ///
    /// Empty `tenors` means the configured defaults.
    pub async fn get_surface(
        &self,
        pair: &CurrencyPair,
        tenors: &[Tenor],
        max_age: Duration,
    ) -> Result<VolatilitySurface> {
        self.get_surface_with_deadline(pair, tenors, max_age, None)
            .await
    }

    /// Surface for `pair`, giving up on unfinished tenors after `deadline`
    ///
    /// Tenors still fetching at the deadline become `deadline_exceeded` gaps
    /// and the surface is returned with `deadline_exceeded` set. Their
    /// fetches keep running and still populate the cache.
    pub async fn get_surface_with_deadline(
        &self,
        pair: &CurrencyPair,
        tenors: &[Tenor],
        max_age: Duration,
        deadline: Option<Duration>,
    ) -> Result<VolatilitySurface> {
        let start = Instant::now();
        let mut tenors = if tenors.is_empty() {
            self.settings.default_tenors.clone()
        } else {
            tenors.to_vec()
        };
        tenors.sort_unstable();
        tenors.dedup();

        if tenors.is_empty() {
            return Err(MarketDataError::invalid_spec("no tenors requested"));
        }

        let deadline_at = deadline.map(|d| start + d);
        let lookups = tenors.iter().map(|tenor| {
            let outcome = self.lookup(pair, *tenor, max_age).into_outcome();
            let tenor = *tenor;
            async move {
                let outcome = match deadline_at {
                    Some(at) => tokio::time::timeout_at(at, outcome)
                        .await
                        .unwrap_or(TenorOutcome::Gap(GapReason::DeadlineExceeded)),
                    None => outcome.await,
                };
                (tenor, outcome)
            }
        });
        let outcomes = join_all(lookups).await;

        let surface = VolatilitySurface::from_outcomes(pair.clone(), outcomes);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        if surface.points.is_empty() && !surface.deadline_exceeded {
            warn!(
                pair = %pair,
                tenors = tenors.len(),
                elapsed_ms,
                "No tenor produced a volatility point"
            );

            let all_unavailable = surface
                .gaps
                .iter()
                .all(|g| g.reason == GapReason::UpstreamUnavailable);
            return Err(if all_unavailable {
                MarketDataError::unavailable(format!(
                    "every tenor of {} failed to reach the upstream",
                    pair
                ))
            } else {
                MarketDataError::IncompleteSurface {
                    pair: pair.to_string(),
                    gaps: surface.gaps,
                }
            });
        }

        info!(
            pair = %pair,
            tenors = tenors.len(),
            points = surface.points.len(),
            gaps = surface.gaps.len(),
            deadline_exceeded = surface.deadline_exceeded,
            elapsed_ms,
            "Surface assembled"
        );

        Ok(surface)
    }

    fn lookup(&self, pair: &CurrencyPair, tenor: Tenor, max_age: Duration) -> Lookup {
        let key = CacheKey::today(pair.clone(), tenor);
        let lookup = self.cache.get_or_fetch(&key, max_age, |id| {
            let cache = self.cache.clone();
            let gateway = self.gateway.clone();
            let resolver = self.resolver.clone();
            let field = self.settings.field.clone();
            let task_key = key.clone();

            let handle = tokio::spawn(async move {
                let outcome = fetch_tenor(&gateway, &resolver, &task_key, field).await;
                cache.complete(&task_key, id, &outcome);
                outcome
            });

            let cache = self.cache.clone();
            let key = key.clone();
            async move {
                match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(pair = %key.pair, tenor = %key.tenor, error = %e, "Surface fetch task failed");
                        cache.abandon(&key, id);
                        TenorOutcome::Gap(GapReason::UpstreamUnavailable)
                    }
                }
            }
            .boxed()
        });

        if let Lookup::Pending { coalesced: true, .. } = &lookup {
            debug!(pair = %pair, tenor = %tenor, "Joined in-flight fetch");
        }
        lookup
    }

    pub fn entry_state(&self, pair: &CurrencyPair, tenor: Tenor) -> EntryState {
        self.cache.state(&CacheKey::today(pair.clone(), tenor))
    }

    pub fn invalidate_pair(&self, pair: &CurrencyPair) -> usize {
        let removed = self.cache.invalidate_pair(pair);
        info!(pair = %pair, removed, "Cache invalidated for pair");
        removed
    }

    pub fn invalidate_all(&self) -> usize {
        let removed = self.cache.invalidate_all();
        info!(removed, "Cache invalidated");
        removed
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Run the cache sweeper until `shutdown` is cancelled
    pub fn spawn_sweeper(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let interval = self.settings.sweep_interval;
        let gateway = self.gateway.config();
        let stuck_after = self.settings.ttl + gateway.timeout * 2 + gateway.retry_backoff;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            info!(interval_secs = interval.as_secs(), "Cache sweeper started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Cache sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = cache.sweep(stuck_after);
                        if evicted > 0 {
                            debug!(evicted, "Swept surface cache");
                        }
                    }
                }
            }
        })
    }
}

async fn fetch_tenor(
    gateway: &MarketDataGateway,
    resolver: &TickerResolver,
    key: &CacheKey,
    field: String,
) -> TenorOutcome {
    let specs = resolver.surface_tickers(&key.pair, key.tenor);

    match gateway.fetch(&specs, &[field]).await {
        Ok(result) => assemble_point(&key.pair, key.tenor, resolver.deltas(), &result),
        Err(e) => {
            debug!(pair = %key.pair, tenor = %key.tenor, error = %e, "Tenor fetch failed");
            TenorOutcome::Gap(gap_for_error(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayConfig;
    use crate::upstream::{StaticReferenceDataClient, UpstreamError};
    use assert_matches::assert_matches;

    fn eurusd() -> CurrencyPair {
        CurrencyPair::parse("EURUSD").unwrap()
    }

    fn settings() -> SurfaceSettings {
        SurfaceSettings {
            deltas: vec![Delta::new(25).unwrap()],
            ..SurfaceSettings::default()
        }
    }

    fn coordinator(client: &Arc<StaticReferenceDataClient>) -> SurfaceCoordinator {
        let gateway = Arc::new(MarketDataGateway::new(client.clone(), GatewayConfig::default()));
        SurfaceCoordinator::new(gateway, settings())
    }

    /// ATM, 25d RR and 25d BF for each (tenor, atm)
    fn quoted(tenors: &[(&str, f64)]) -> StaticReferenceDataClient {
        tenors.iter().fold(StaticReferenceDataClient::new(), |client, (tenor, atm)| {
            client
                .with_quote(&format!("EURUSDV{} Curncy", tenor), *atm)
                .with_quote(&format!("EURUSD25R{} Curncy", tenor), 0.20)
                .with_quote(&format!("EURUSD25B{} Curncy", tenor), 0.18)
        })
    }

    const MAX_AGE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_eurusd_1m_end_to_end() {
        let client = Arc::new(
            StaticReferenceDataClient::new()
                .with_quote("EURUSDV1M Curncy", 7.54)
                .with_quote("EURUSD25R1M Curncy", 0.04)
                .with_quote("EURUSD25B1M Curncy", 0.18),
        );
        let coord = coordinator(&client);

        let surface = coord.get_surface(&eurusd(), &[Tenor::M1], MAX_AGE).await.unwrap();

        assert_eq!(surface.points.len(), 1);
        assert!(surface.gaps.is_empty());
        let point = &surface.points[0];
        let d25 = Delta::new(25).unwrap();
        assert_eq!(point.atm, 7.54);
        assert_eq!(point.risk_reversals[&d25], 0.04);
        assert_eq!(point.butterflies[&d25], 0.18);

        let requested = &client.requests()[0].securities;
        assert_eq!(
            requested,
            &vec![
                "EURUSDV1M Curncy".to_string(),
                "EURUSD25R1M Curncy".to_string(),
                "EURUSD25B1M Curncy".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_coalesce() {
        let client = Arc::new(quoted(&[("1M", 7.5)]).with_latency(Duration::from_millis(200)));
        let coord = coordinator(&client);

        let requests = (0..10).map(|_| {
            let coord = coord.clone();
            async move { coord.get_surface(&eurusd(), &[Tenor::M1], MAX_AGE).await }
        });
        let surfaces = join_all(requests).await;

        assert_eq!(client.calls(), 1);
        for surface in surfaces {
            assert_eq!(surface.unwrap().points[0].atm, 7.5);
        }
        let stats = coord.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.coalesced, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalesce_across_spawned_tasks() {
        let client = Arc::new(quoted(&[("3M", 7.9)]).with_latency(Duration::from_millis(200)));
        let coord = coordinator(&client);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let coord = coord.clone();
                tokio::spawn(async move { coord.get_surface(&eurusd(), &[Tenor::M3], MAX_AGE).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_keeps_other_tenors() {
        let client = Arc::new(
            quoted(&[("1M", 7.5), ("3M", 7.9), ("6M", 8.2)])
                .with_slow_security("EURUSDV6M Curncy", Duration::from_secs(30)),
        );
        let coord = coordinator(&client);

        let surface = coord
            .get_surface(&eurusd(), &[Tenor::M6, Tenor::M1, Tenor::M3], MAX_AGE)
            .await
            .unwrap();

        let tenors: Vec<Tenor> = surface.points.iter().map(|p| p.tenor).collect();
        assert_eq!(tenors, vec![Tenor::M1, Tenor::M3]);
        assert_eq!(surface.gap_tenors(), vec![Tenor::M6]);
        assert_eq!(surface.gaps[0].reason, GapReason::Timeout);
        assert!(!surface.deadline_exceeded);
        assert_eq!(coord.entry_state(&eurusd(), Tenor::M6), EntryState::Empty);
    }

    #[tokio::test]
    async fn test_all_tenors_failing_is_incomplete() {
        let client = Arc::new(
            StaticReferenceDataClient::new()
                .with_null("EURUSDV1M Curncy")
                .with_not_found("EURUSDV3M Curncy"),
        );
        let coord = coordinator(&client);

        let result = coord.get_surface(&eurusd(), &[Tenor::M1, Tenor::M3], MAX_AGE).await;

        assert_matches!(result, Err(MarketDataError::IncompleteSurface { gaps, .. }) => {
            assert_eq!(gaps.len(), 2);
            assert_eq!(gaps[0].reason, GapReason::MissingAtm);
            assert_eq!(gaps[1].reason, GapReason::NotFound);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_upstream_is_unavailable() {
        let client = Arc::new(quoted(&[("1M", 7.5)]).with_unavailable());
        let coord = coordinator(&client);

        let result = coord.get_surface(&eurusd(), &[Tenor::M1, Tenor::M3], MAX_AGE).await;

        assert_matches!(result, Err(MarketDataError::UpstreamUnavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_refreshes() {
        let client = Arc::new(quoted(&[("1M", 7.5)]));
        let coord = coordinator(&client);

        coord.get_surface(&eurusd(), &[Tenor::M1], MAX_AGE).await.unwrap();
        client.set_quote("EURUSDV1M Curncy", Some(7.6));

        let cached = coord.get_surface(&eurusd(), &[Tenor::M1], MAX_AGE).await.unwrap();
        assert_eq!(cached.points[0].atm, 7.5);
        assert_eq!(client.calls(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(coord.entry_state(&eurusd(), Tenor::M1), EntryState::Stale);

        let refreshed = coord.get_surface(&eurusd(), &[Tenor::M1], MAX_AGE).await.unwrap();
        assert_eq!(refreshed.points[0].atm, 7.6);
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_age_shorter_than_ttl() {
        let client = Arc::new(quoted(&[("1M", 7.5)]));
        let coord = coordinator(&client);

        coord.get_surface(&eurusd(), &[Tenor::M1], MAX_AGE).await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;

        coord.get_surface(&eurusd(), &[Tenor::M1], MAX_AGE).await.unwrap();
        assert_eq!(client.calls(), 1);

        coord
            .get_surface(&eurusd(), &[Tenor::M1], Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_serves_previous_point() {
        let client = Arc::new(quoted(&[("1M", 7.5)]));
        let coord = coordinator(&client);

        coord.get_surface(&eurusd(), &[Tenor::M1], MAX_AGE).await.unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;
        client.set_unavailable(true);

        let result = coord
            .get_surface(&eurusd(), &[Tenor::M1], Duration::from_secs(10))
            .await;
        assert_matches!(result, Err(MarketDataError::UpstreamUnavailable(_)));

        client.set_unavailable(false);
        let surface = coord.get_surface(&eurusd(), &[Tenor::M1], MAX_AGE).await.unwrap();
        assert_eq!(surface.points[0].atm, 7.5);
    }

    #[tokio::test]
    async fn test_invalidation_forces_refetch() {
        let client = Arc::new(quoted(&[("1M", 7.5)]));
        let coord = coordinator(&client);
        let usdjpy = CurrencyPair::parse("USDJPY").unwrap();

        coord.get_surface(&eurusd(), &[Tenor::M1], MAX_AGE).await.unwrap();
        assert_eq!(coord.invalidate_pair(&usdjpy), 0);
        assert_eq!(coord.invalidate_pair(&eurusd()), 1);
        assert_eq!(coord.entry_state(&eurusd(), Tenor::M1), EntryState::Empty);

        coord.get_surface(&eurusd(), &[Tenor::M1], MAX_AGE).await.unwrap();
        assert_eq!(client.calls(), 2);

        assert_eq!(coord.invalidate_all(), 1);
        assert_eq!(coord.stats().entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_returns_partial_and_fetch_completes() {
        let client = Arc::new(
            quoted(&[("1M", 7.5), ("6M", 8.2)])
                .with_slow_security("EURUSDV6M Curncy", Duration::from_secs(3)),
        );
        let coord = coordinator(&client);

        let surface = coord
            .get_surface_with_deadline(
                &eurusd(),
                &[Tenor::M1, Tenor::M6],
                MAX_AGE,
                Some(Duration::from_secs(1)),
            )
            .await
            .unwrap();

        assert!(surface.deadline_exceeded);
        assert_eq!(surface.points.len(), 1);
        assert_eq!(surface.gaps[0].reason, GapReason::DeadlineExceeded);
        assert_eq!(coord.entry_state(&eurusd(), Tenor::M6), EntryState::Fetching);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(coord.entry_state(&eurusd(), Tenor::M6), EntryState::Fresh);
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_with_no_points_is_not_incomplete() {
        let client = Arc::new(
            quoted(&[("1M", 7.5)]).with_slow_security("EURUSDV1M Curncy", Duration::from_secs(3)),
        );
        let coord = coordinator(&client);

        let surface = coord
            .get_surface_with_deadline(&eurusd(), &[Tenor::M1], MAX_AGE, Some(Duration::from_secs(1)))
            .await
            .unwrap();

        assert!(surface.points.is_empty());
        assert!(surface.deadline_exceeded);
    }

    #[tokio::test]
    async fn test_duplicate_and_default_tenors() {
        let client = Arc::new(quoted(&[("1M", 7.5), ("3M", 7.9)]));
        let coord = coordinator(&client);

        let surface = coord
            .get_surface(&eurusd(), &[Tenor::M3, Tenor::M1, Tenor::M3], MAX_AGE)
            .await
            .unwrap();
        assert_eq!(surface.points.len(), 2);
        assert!(surface.is_ordered());

        let defaults = coord.get_surface(&eurusd(), &[], MAX_AGE).await.unwrap();
        let requested = defaults.points.len() + defaults.gaps.len();
        assert_eq!(requested, coord.settings().default_tenors.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_recovers_within_request() {
        let client = Arc::new(
            quoted(&[("1M", 7.5)]).with_failure(UpstreamError::Status {
                status: 502,
                message: "bad gateway".into(),
            }),
        );
        let coord = coordinator(&client);

        let surface = coord.get_surface(&eurusd(), &[Tenor::M1], MAX_AGE).await.unwrap();

        assert_eq!(surface.points.len(), 1);
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_and_stops() {
        let client = Arc::new(quoted(&[("1M", 7.5)]));
        let coord = coordinator(&client);
        let shutdown = CancellationToken::new();
        let sweeper = coord.spawn_sweeper(shutdown.clone());

        coord.get_surface(&eurusd(), &[Tenor::M1], MAX_AGE).await.unwrap();
        assert_eq!(coord.stats().entries, 1);

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(coord.stats().entries, 0);
        assert_eq!(coord.stats().evictions, 1);

        shutdown.cancel();
        sweeper.await.unwrap();
    }

    #[test]
    fn test_settings_from_config() {
        let yaml = r#"
service:
  name: volgate
upstream:
  kind: static
surface:
  deltas: [25]
  default_tenors: ["1M", "12M"]
  request_deadline_ms: 0
"#;
        let config = config::parse_config(yaml).unwrap();
        let settings = SurfaceSettings::from_config(&config).unwrap();

        assert_eq!(settings.default_tenors, vec![Tenor::M1, Tenor::Y1]);
        assert_eq!(settings.request_deadline, None);
        assert_eq!(settings.ttl, Duration::from_secs(60));
    }
}
