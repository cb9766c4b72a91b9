use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "volgate")]
#[command(about = "VolGate - FX volatility surface gateway")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the gateway with the given configuration
    Start {
        /// Path to the configuration file
        #[arg(short, long, default_value = "volgate.yaml", env = "VOLGATE_CONFIG")]
        config: PathBuf,

        /// Override HTTP port
        #[arg(long)]
        http: Option<u16>,

        /// Override the configured log format
        #[arg(long, value_enum)]
        log_format: Option<LogFormatArg>,
    },

    /// Validate configuration without starting the gateway
    Validate {
        /// Path to the configuration file
        #[arg(short, long, default_value = "volgate.yaml", env = "VOLGATE_CONFIG")]
        config: PathBuf,
    },

    /// Initialize a new configuration file with all defaults
    Init {
        /// Output path for the new configuration file
        #[arg(short, long, default_value = "volgate.yaml")]
        output: PathBuf,
    },

    /// Print the canonical ticker for one quote
    Resolve {
        /// Currency pair, e.g. EURUSD or EUR/USD
        pair: String,

        /// Tenor, e.g. 1W, 1M, 1Y
        tenor: String,

        /// Product kind
        #[arg(short, long, value_enum, default_value = "atm")]
        kind: KindArg,

        /// Delta for risk reversals and butterflies (5, 10, 15, 25, 35)
        #[arg(short, long)]
        delta: Option<u8>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindArg {
    /// At-the-money volatility
    Atm,
    /// Risk reversal
    #[value(alias = "rr")]
    RiskReversal,
    /// Butterfly
    #[value(alias = "bf")]
    Butterfly,
}

impl KindArg {
    pub fn as_str(&self) -> &'static str {
        match self {
            KindArg::Atm => "atm",
            KindArg::RiskReversal => "risk_reversal",
            KindArg::Butterfly => "butterfly",
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormatArg {
    Pretty,
    Json,
    Compact,
}

impl LogFormatArg {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormatArg::Pretty => "pretty",
            LogFormatArg::Json => "json",
            LogFormatArg::Compact => "compact",
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_overrides() {
        let cli = Cli::try_parse_from([
            "volgate", "start", "-c", "conf/prod.yaml", "--http", "9000", "--log-format", "json",
        ])
        .unwrap();

        match cli.command {
            Commands::Start { config, http, log_format } => {
                assert_eq!(config, PathBuf::from("conf/prod.yaml"));
                assert_eq!(http, Some(9000));
                assert_eq!(log_format, Some(LogFormatArg::Json));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_args() {
        let cli = Cli::try_parse_from(["volgate", "resolve", "EURUSD", "1M", "-k", "rr", "-d", "25"]).unwrap();

        match cli.command {
            Commands::Resolve { pair, tenor, kind, delta } => {
                assert_eq!(pair, "EURUSD");
                assert_eq!(tenor, "1M");
                assert_eq!(kind, KindArg::RiskReversal);
                assert_eq!(kind.as_str(), "risk_reversal");
                assert_eq!(delta, Some(25));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_defaults_to_atm() {
        let cli = Cli::try_parse_from(["volgate", "resolve", "USDJPY", "3M"]).unwrap();
        assert!(matches!(cli.command, Commands::Resolve { kind: KindArg::Atm, delta: None, .. }));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(Cli::try_parse_from(["volgate", "resolve", "EURUSD", "1M", "-k", "strangle"]).is_err());
    }
}
