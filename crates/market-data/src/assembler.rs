//! Builds volatility points from gateway results

use crate::error::MarketDataError;
use crate::gateway::{FailureKind, FetchResult};
use crate::ticker::TickerSpec;
use crate::types::{CurrencyPair, Delta, GapReason, Tenor, TenorOutcome, VolatilityPoint};
use tracing::debug;

/// Gap reason for an ATM ticker that failed
pub fn gap_for_failure(kind: FailureKind) -> GapReason {
    match kind {
        FailureKind::Timeout => GapReason::Timeout,
        FailureKind::NotFound => GapReason::NotFound,
        FailureKind::Unavailable | FailureKind::Rejected => GapReason::UpstreamUnavailable,
        FailureKind::Missing => GapReason::MissingAtm,
    }
}

/// Gap reason for a gateway call that failed as a whole
pub fn gap_for_error(error: &MarketDataError) -> GapReason {
    match error {
        MarketDataError::Timeout { .. } => GapReason::Timeout,
        MarketDataError::UpstreamUnavailable(_) => GapReason::UpstreamUnavailable,
        MarketDataError::InvalidSpec(_)
        | MarketDataError::PartialFailure { .. }
        | MarketDataError::IncompleteSurface { .. } => GapReason::MissingAtm,
    }
}

fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Assemble one (pair, tenor) point
///
/// Without a usable ATM value the tenor is a gap. Missing RR or BF quotes
/// only leave the smile incomplete.
pub fn assemble_point(
    pair: &CurrencyPair,
    tenor: Tenor,
    deltas: &[Delta],
    result: &FetchResult,
) -> TenorOutcome {
    let atm_spec = TickerSpec::atm(pair.clone(), tenor);

    if let Some(failure) = result.failure(&atm_spec) {
        return TenorOutcome::Gap(gap_for_failure(failure.kind));
    }
    let Some(atm_quote) = result.quotes.iter().find(|q| q.spec == atm_spec) else {
        return TenorOutcome::Gap(GapReason::MissingAtm);
    };
    let Some(atm) = usable(atm_quote.value) else {
        return TenorOutcome::Gap(GapReason::MissingAtm);
    };

    let mut point = VolatilityPoint::new(pair.clone(), tenor, atm);
    point.as_of = atm_quote.as_of;

    for delta in deltas {
        let rr = TickerSpec::risk_reversal(pair.clone(), tenor, *delta);
        if let Some(value) = usable(result.value(&rr)) {
            point.risk_reversals.insert(*delta, value);
        }
        let bf = TickerSpec::butterfly(pair.clone(), tenor, *delta);
        if let Some(value) = usable(result.value(&bf)) {
            point.butterflies.insert(*delta, value);
        }
    }

    if !point.is_complete(deltas) {
        debug!(
            pair = %pair,
            tenor = %tenor,
            risk_reversals = point.risk_reversals.len(),
            butterflies = point.butterflies.len(),
            "Incomplete smile"
        );
    }

    TenorOutcome::Point(point)
}
