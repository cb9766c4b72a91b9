//! Ticker resolution
//!
//! Every volatility quote is addressed by one canonical ticker:
//!
//! | product        | ticker               |
//! |----------------|----------------------|
//! | ATM            | `EURUSDV1M Curncy`   |
//! | risk reversal  | `EURUSD25R1M Curncy` |
//! | butterfly      | `EURUSD25B1M Curncy` |
//!
//! [`TickerSpec::parse`] also reads the legacy spellings still found in
//! upstream responses and static quote files (`RR`/`BF` product codes, a
//! pricing-source token such as `BGN`, a missing `Curncy` key, lower case)
//! and always re-emits the canonical form.

use crate::error::MarketDataError;
use crate::types::{CurrencyPair, Delta, ProductKind, Tenor};
use crate::Result;
use std::fmt;

/// Yellow key appended to every FX ticker
pub const YELLOW_KEY: &str = "Curncy";

/// A fully validated reference to one volatility quote
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickerSpec {
    pub pair: CurrencyPair,
    pub tenor: Tenor,
    pub kind: ProductKind,
    pub delta: Option<Delta>,
}

impl TickerSpec {
    /// Build a spec, enforcing that RR/BF carry a delta and ATM does not
    pub fn new(
        pair: CurrencyPair,
        tenor: Tenor,
        kind: ProductKind,
        delta: Option<Delta>,
    ) -> Result<Self> {
        match (kind, delta) {
            (ProductKind::Atm, Some(d)) => Err(MarketDataError::invalid_spec(format!(
                "ATM volatility does not take a delta (got {})",
                d
            ))),
            (ProductKind::RiskReversal | ProductKind::Butterfly, None) => Err(
                MarketDataError::invalid_spec(format!("{:?} requires a delta", kind)),
            ),
            _ => Ok(Self {
                pair,
                tenor,
                kind,
                delta,
            }),
        }
    }

    pub fn atm(pair: CurrencyPair, tenor: Tenor) -> Self {
        Self {
            pair,
            tenor,
            kind: ProductKind::Atm,
            delta: None,
        }
    }

    pub fn risk_reversal(pair: CurrencyPair, tenor: Tenor, delta: Delta) -> Self {
        Self {
            pair,
            tenor,
            kind: ProductKind::RiskReversal,
            delta: Some(delta),
        }
    }

    pub fn butterfly(pair: CurrencyPair, tenor: Tenor, delta: Delta) -> Self {
        Self {
            pair,
            tenor,
            kind: ProductKind::Butterfly,
            delta: Some(delta),
        }
    }

    /// Canonical ticker string
    pub fn ticker(&self) -> String {
        match self.delta {
            Some(delta) => format!(
                "{}{}{}{} {}",
                self.pair,
                delta,
                self.kind.code(),
                self.tenor,
                YELLOW_KEY
            ),
            None => format!("{}{}{} {}", self.pair, self.kind.code(), self.tenor, YELLOW_KEY),
        }
    }

    /// Parse a canonical or legacy ticker
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |why: &str| {
            MarketDataError::invalid_spec(format!("cannot parse ticker '{}': {}", input.trim(), why))
        };

        let upper = input.trim().to_ascii_uppercase();
        let mut tokens: Vec<&str> = upper.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(invalid("empty"));
        }

        if tokens.len() > 1 && tokens[tokens.len() - 1] == "CURNCY" {
            tokens.pop();
        }
        match tokens.len() {
            1 => {}
            2 if tokens[1].bytes().all(|b| b.is_ascii_alphabetic()) => {}
            _ => return Err(invalid("unexpected tokens after ticker")),
        }

        let body = tokens[0];
        if body.len() < 8 || !body.is_char_boundary(6) {
            return Err(invalid("too short"));
        }
        let pair = CurrencyPair::parse(&body[..6])?;
        let rest = &body[6..];

        if let Some(tenor) = rest.strip_prefix('V') {
            return Ok(Self::atm(pair, Tenor::parse(tenor)?));
        }

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return Err(invalid("missing product code"));
        }
        let delta: u8 = rest[..digits].parse().map_err(|_| invalid("bad delta"))?;
        let delta = Delta::new(delta)?;
        let rest = &rest[digits..];

        let (kind, tenor) = if let Some(t) = rest.strip_prefix("RR") {
            (ProductKind::RiskReversal, t)
        } else if let Some(t) = rest.strip_prefix("BF") {
            (ProductKind::Butterfly, t)
        } else if let Some(t) = rest.strip_prefix('R') {
            (ProductKind::RiskReversal, t)
        } else if let Some(t) = rest.strip_prefix('B') {
            (ProductKind::Butterfly, t)
        } else {
            return Err(invalid("unknown product code"));
        };

        Self::new(pair, Tenor::parse(tenor)?, kind, Some(delta))
    }
}

impl fmt::Display for TickerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ticker())
    }
}

/// Resolve caller input into a [`TickerSpec`]
///
/// Pure: the same input always yields the same spec or the same error.
pub fn resolve(pair: &str, tenor: &str, kind: ProductKind, delta: Option<u8>) -> Result<TickerSpec> {
    let pair = CurrencyPair::parse(pair)?;
    let tenor = Tenor::parse(tenor)?;
    let delta = delta.map(Delta::new).transpose()?;
    TickerSpec::new(pair, tenor, kind, delta)
}

/// Expands a (pair, tenor) into every ticker a surface point needs
#[derive(Debug, Clone)]
pub struct TickerResolver {
    deltas: Vec<Delta>,
}

impl TickerResolver {
    pub fn new(deltas: Vec<Delta>) -> Self {
        Self { deltas }
    }

    pub fn from_deltas(deltas: &[u8]) -> Result<Self> {
        let mut parsed = Vec::with_capacity(deltas.len());
        for d in deltas {
            let delta = Delta::new(*d)?;
            if !parsed.contains(&delta) {
                parsed.push(delta);
            }
        }
        Ok(Self::new(parsed))
    }

    pub fn deltas(&self) -> &[Delta] {
        &self.deltas
    }

    /// ATM first, then RR and BF for each configured delta
    pub fn surface_tickers(&self, pair: &CurrencyPair, tenor: Tenor) -> Vec<TickerSpec> {
        let mut specs = Vec::with_capacity(1 + self.deltas.len() * 2);
        specs.push(TickerSpec::atm(pair.clone(), tenor));
        for delta in &self.deltas {
            specs.push(TickerSpec::risk_reversal(pair.clone(), tenor, *delta));
            specs.push(TickerSpec::butterfly(pair.clone(), tenor, *delta));
        }
        specs
    }
}

impl Default for TickerResolver {
    fn default() -> Self {
        Self::new(
            config::default_deltas()
                .into_iter()
                .filter_map(|d| Delta::new(d).ok())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_resolve_canonical_tickers() {
        let atm = resolve("EURUSD", "1M", ProductKind::Atm, None).unwrap();
        assert_eq!(atm.ticker(), "EURUSDV1M Curncy");

        let rr = resolve("EURUSD", "1M", ProductKind::RiskReversal, Some(25)).unwrap();
        assert_eq!(rr.ticker(), "EURUSD25R1M Curncy");

        let bf = resolve("usdjpy", "3m", ProductKind::Butterfly, Some(10)).unwrap();
        assert_eq!(bf.ticker(), "USDJPY10B3M Curncy");
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let a = resolve("EURUSD", "6M", ProductKind::Butterfly, Some(25)).unwrap();
        let b = resolve("EURUSD", "6M", ProductKind::Butterfly, Some(25)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.ticker(), b.ticker());
    }

    #[test]
    fn test_resolve_rejects_atm_with_delta() {
        let result = resolve("EURUSD", "1M", ProductKind::Atm, Some(25));
        assert_matches!(result, Err(MarketDataError::InvalidSpec(_)));
    }

    #[test]
    fn test_resolve_rejects_bad_input() {
        assert_matches!(
            resolve("EURUSD", "1M", ProductKind::RiskReversal, None),
            Err(MarketDataError::InvalidSpec(_))
        );
        assert_matches!(
            resolve("EURUSD", "1M", ProductKind::Butterfly, Some(20)),
            Err(MarketDataError::InvalidSpec(_))
        );
        assert_matches!(
            resolve("EURUS", "1M", ProductKind::Atm, None),
            Err(MarketDataError::InvalidSpec(_))
        );
        assert_matches!(
            resolve("EURUSD", "5Y", ProductKind::Atm, None),
            Err(MarketDataError::InvalidSpec(_))
        );
    }

    #[test]
    fn test_parse_canonical_round_trip() {
        for ticker in ["EURUSDV1M Curncy", "EURUSD25R1M Curncy", "GBPUSD10B1Y Curncy"] {
            assert_eq!(TickerSpec::parse(ticker).unwrap().ticker(), ticker);
        }
    }

    #[test]
    fn test_parse_legacy_aliases() {
        let cases = [
            ("EURUSD25RR1M Curncy", "EURUSD25R1M Curncy"),
            ("EURUSD25BF1M Curncy", "EURUSD25B1M Curncy"),
            ("EURUSD25R1M BGN Curncy", "EURUSD25R1M Curncy"),
            ("EURUSDV1M", "EURUSDV1M Curncy"),
            ("eurusd25rr3m bgn curncy", "EURUSD25R3M Curncy"),
            ("  EURUSDV12M Curncy ", "EURUSDV1Y Curncy"),
        ];

        for (legacy, canonical) in cases {
            let spec = TickerSpec::parse(legacy).unwrap();
            assert_eq!(spec.ticker(), canonical, "input {:?}", legacy);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "EURUSD", "EURUSDX1M Curncy", "EURUSD25Q1M Curncy", "EURUSD25R1M A B Curncy"] {
            assert_matches!(TickerSpec::parse(bad), Err(MarketDataError::InvalidSpec(_)), "input {:?}", bad);
        }
    }

    #[test]
    fn test_surface_tickers() {
        let resolver = TickerResolver::from_deltas(&[25, 10, 25]).unwrap();
        let pair = CurrencyPair::parse("EURUSD").unwrap();

        let tickers: Vec<String> = resolver
            .surface_tickers(&pair, Tenor::M1)
            .iter()
            .map(TickerSpec::ticker)
            .collect();

        assert_eq!(
            tickers,
            vec![
                "EURUSDV1M Curncy",
                "EURUSD25R1M Curncy",
                "EURUSD25B1M Curncy",
                "EURUSD10R1M Curncy",
                "EURUSD10B1M Curncy",
            ]
        );
    }
}
