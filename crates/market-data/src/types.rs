//! Shared types for FX volatility data

use crate::error::MarketDataError;
use crate::ticker::TickerSpec;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Currency pair in market order, e.g. `EURUSD`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CurrencyPair(String);

impl CurrencyPair {
    /// Accepts `EURUSD`, `eurusd` and `EUR/USD`
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let compact = match s.len() {
            6 => s.to_string(),
            7 if s.as_bytes()[3] == b'/' => format!("{}{}", &s[..3], &s[4..]),
            _ => {
                return Err(MarketDataError::invalid_spec(format!(
                    "currency pair must be six letters, got '{}'",
                    s
                )))
            }
        };

        if !compact.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(MarketDataError::invalid_spec(format!(
                "currency pair must be alphabetic, got '{}'",
                s
            )));
        }

        let compact = compact.to_ascii_uppercase();
        if compact[..3] == compact[3..] {
            return Err(MarketDataError::invalid_spec(format!(
                "base and quote currency are both {}",
                &compact[..3]
            )));
        }

        Ok(Self(compact))
    }

    pub fn base(&self) -> &str {
        &self.0[..3]
    }

    pub fn quote(&self) -> &str {
        &self.0[3..]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CurrencyPair {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for CurrencyPair {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CurrencyPair {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Supported option tenors, ordered by maturity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tenor {
    W1,
    W2,
    M1,
    M2,
    M3,
    M6,
    M9,
    Y1,
    Y2,
}

impl Tenor {
    pub const ALL: [Tenor; 9] = [
        Tenor::W1,
        Tenor::W2,
        Tenor::M1,
        Tenor::M2,
        Tenor::M3,
        Tenor::M6,
        Tenor::M9,
        Tenor::Y1,
        Tenor::Y2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tenor::W1 => "1W",
            Tenor::W2 => "2W",
            Tenor::M1 => "1M",
            Tenor::M2 => "2M",
            Tenor::M3 => "3M",
            Tenor::M6 => "6M",
            Tenor::M9 => "9M",
            Tenor::Y1 => "1Y",
            Tenor::Y2 => "2Y",
        }
    }

    /// Parse a tenor code; `12M` and `24M` are accepted for `1Y` and `2Y`
    pub fn parse(s: &str) -> Result<Self> {
        let code = s.trim().to_ascii_uppercase();
        match code.as_str() {
            "12M" => return Ok(Tenor::Y1),
            "24M" => return Ok(Tenor::Y2),
            _ => {}
        }

        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == code)
            .ok_or_else(|| {
                MarketDataError::invalid_spec(format!(
                    "unsupported tenor '{}', expected one of 1W,2W,1M,2M,3M,6M,9M,1Y,2Y",
                    s.trim()
                ))
            })
    }

    /// Parse a comma-separated list such as `1M,3M,6M`
    pub fn parse_list(s: &str) -> Result<Vec<Self>> {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(Self::parse)
            .collect()
    }
}

impl fmt::Display for Tenor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tenor {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Tenor {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Tenor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Quoted delta for risk reversals and butterflies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Delta(u8);

impl Delta {
    pub const VALID: [u8; 5] = [5, 10, 15, 25, 35];

    pub fn new(value: u8) -> Result<Self> {
        if Self::VALID.contains(&value) {
            Ok(Self(value))
        } else {
            Err(MarketDataError::invalid_spec(format!(
                "unsupported delta {}, expected one of 5,10,15,25,35",
                value
            )))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Delta {
    type Error = MarketDataError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Delta> for u8 {
    fn from(delta: Delta) -> u8 {
        delta.0
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Quoted volatility product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    Atm,
    RiskReversal,
    Butterfly,
}

impl ProductKind {
    /// Product letter in the canonical ticker grammar
    pub fn code(&self) -> char {
        match self {
            ProductKind::Atm => 'V',
            ProductKind::RiskReversal => 'R',
            ProductKind::Butterfly => 'B',
        }
    }

    pub fn requires_delta(&self) -> bool {
        !matches!(self, ProductKind::Atm)
    }
}

impl FromStr for ProductKind {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "atm" | "v" => Ok(ProductKind::Atm),
            "rr" | "r" | "risk_reversal" | "riskreversal" => Ok(ProductKind::RiskReversal),
            "bf" | "b" | "butterfly" => Ok(ProductKind::Butterfly),
            other => Err(MarketDataError::invalid_spec(format!(
                "unknown product kind '{}'",
                other
            ))),
        }
    }
}

/// One (ticker, field) value as returned by the upstream
///
/// `value: None` means the vendor answered without data. A field the vendor
/// never answered for is reported as a ticker failure instead.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteField {
    pub spec: TickerSpec,
    pub ticker: String,
    pub field: String,
    pub value: Option<f64>,
    pub as_of: DateTime<Utc>,
}

/// Put and call volatility at one delta
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SmilePoint {
    pub delta: Delta,
    pub put: f64,
    pub call: f64,
}

/// Put-side volatility: `atm + bf - rr / 2`
///
/// Risk reversals are taken as call minus put.
pub fn put_vol(atm: f64, rr: f64, bf: f64) -> f64 {
    atm + bf - rr / 2.0
}

/// Call-side volatility: `atm + bf + rr / 2`
pub fn call_vol(atm: f64, rr: f64, bf: f64) -> f64 {
    atm + bf + rr / 2.0
}

/// Volatility quotes for one (pair, tenor)
#[derive(Debug, Clone, PartialEq)]
pub struct VolatilityPoint {
    pub pair: CurrencyPair,
    pub tenor: Tenor,
    pub atm: f64,
    pub risk_reversals: BTreeMap<Delta, f64>,
    pub butterflies: BTreeMap<Delta, f64>,
    pub as_of: DateTime<Utc>,
}

impl VolatilityPoint {
    pub fn new(pair: CurrencyPair, tenor: Tenor, atm: f64) -> Self {
        Self {
            pair,
            tenor,
            atm,
            risk_reversals: BTreeMap::new(),
            butterflies: BTreeMap::new(),
            as_of: Utc::now(),
        }
    }

    pub fn with_risk_reversal(mut self, delta: Delta, value: f64) -> Self {
        self.risk_reversals.insert(delta, value);
        self
    }

    pub fn with_butterfly(mut self, delta: Delta, value: f64) -> Self {
        self.butterflies.insert(delta, value);
        self
    }

    pub fn put_vol(&self, delta: Delta) -> Option<f64> {
        let rr = self.risk_reversals.get(&delta)?;
        let bf = self.butterflies.get(&delta)?;
        Some(put_vol(self.atm, *rr, *bf))
    }

    pub fn call_vol(&self, delta: Delta) -> Option<f64> {
        let rr = self.risk_reversals.get(&delta)?;
        let bf = self.butterflies.get(&delta)?;
        Some(call_vol(self.atm, *rr, *bf))
    }

    /// Wing volatilities for every delta quoted with both RR and BF
    pub fn smile(&self) -> Vec<SmilePoint> {
        self.risk_reversals
            .iter()
            .filter_map(|(delta, rr)| {
                let bf = self.butterflies.get(delta)?;
                Some(SmilePoint {
                    delta: *delta,
                    put: put_vol(self.atm, *rr, *bf),
                    call: call_vol(self.atm, *rr, *bf),
                })
            })
            .collect()
    }

    /// True when RR and BF are present for every delta in `deltas`
    pub fn is_complete(&self, deltas: &[Delta]) -> bool {
        deltas
            .iter()
            .all(|d| self.risk_reversals.contains_key(d) && self.butterflies.contains_key(d))
    }
}

/// Why a requested tenor is absent from a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapReason {
    /// Vendor answered without an ATM value
    MissingAtm,
    /// ATM ticker timed out after the retry
    Timeout,
    /// Vendor does not know the ATM ticker
    NotFound,
    /// Connection-level upstream failure
    UpstreamUnavailable,
    /// The caller's deadline passed before the fetch finished
    DeadlineExceeded,
}

impl fmt::Display for GapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GapReason::MissingAtm => "missing_atm",
            GapReason::Timeout => "timeout",
            GapReason::NotFound => "not_found",
            GapReason::UpstreamUnavailable => "upstream_unavailable",
            GapReason::DeadlineExceeded => "deadline_exceeded",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Gap {
    pub tenor: Tenor,
    pub reason: GapReason,
}

/// Result of resolving one tenor of a surface request
#[derive(Debug, Clone, PartialEq)]
pub enum TenorOutcome {
    Point(VolatilityPoint),
    Gap(GapReason),
}

/// Assembled surface for one pair
///
/// `points` are strictly ascending by tenor. Every requested tenor appears
/// exactly once, either as a point or as a gap.
#[derive(Debug, Clone, PartialEq)]
pub struct VolatilitySurface {
    pub pair: CurrencyPair,
    pub as_of: DateTime<Utc>,
    pub points: Vec<VolatilityPoint>,
    pub gaps: Vec<Gap>,
    pub deadline_exceeded: bool,
}

impl VolatilitySurface {
    /// Build a surface from per-tenor outcomes completed in any order
    pub fn from_outcomes(pair: CurrencyPair, outcomes: Vec<(Tenor, TenorOutcome)>) -> Self {
        let mut by_tenor: BTreeMap<Tenor, TenorOutcome> = BTreeMap::new();
        for (tenor, outcome) in outcomes {
            by_tenor.entry(tenor).or_insert(outcome);
        }

        let mut points = Vec::new();
        let mut gaps = Vec::new();
        for (tenor, outcome) in by_tenor {
            match outcome {
                TenorOutcome::Point(point) => points.push(point),
                TenorOutcome::Gap(reason) => gaps.push(Gap { tenor, reason }),
            }
        }

        let deadline_exceeded = gaps
            .iter()
            .any(|g| g.reason == GapReason::DeadlineExceeded);
        let as_of = points
            .iter()
            .map(|p| p.as_of)
            .max()
            .unwrap_or_else(Utc::now);

        Self {
            pair,
            as_of,
            points,
            gaps,
            deadline_exceeded,
        }
    }

    pub fn point(&self, tenor: Tenor) -> Option<&VolatilityPoint> {
        self.points.iter().find(|p| p.tenor == tenor)
    }

    pub fn gap_tenors(&self) -> Vec<Tenor> {
        self.gaps.iter().map(|g| g.tenor).collect()
    }

    pub fn is_ordered(&self) -> bool {
        self.points.windows(2).all(|w| w[0].tenor < w[1].tenor)
    }
}
