use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, warn};
use zeng_backtester::{synthetic_candles, BacktestConfig, Backtester, Rule};
use zeng_config::{load_config, AppConfig};
use zeng_core::Candle;

use crate::telemetry::init_tracing;
use crate::ticker::TickerRunArgs;

#[derive(Parser)]
#[command(author, version, about = "Zeng multi-broker ticker and backtester")]
pub struct Cli {
    /// Increases logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Selects which configuration environment to load (maps to config/{env}.toml)
    #[arg(long, default_value = "default")]
    env: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Backtesting workflows
    Backtest {
        #[command(subcommand)]
        action: BacktestCommand,
    },
    /// Live multi-broker ticker
    Ticker {
        #[command(subcommand)]
        action: TickerCommand,
    },
}

#[derive(Subcommand)]
pub enum BacktestCommand {
    /// Replay a rule over historical or synthetic candles
    Run(BacktestRunArgs),
}

#[derive(Subcommand)]
pub enum TickerCommand {
    /// Run the ticker engine, reading host messages as JSON lines on stdin
    Run(TickerRunArgs),
}

#[derive(Args)]
pub struct BacktestRunArgs {
    /// JSON file with `conditions` and `actions`
    #[arg(long)]
    rule: PathBuf,
    /// Candle file (`.csv` with a header row, or a `.json` array)
    #[arg(long, conflicts_with = "synthetic")]
    candles: Option<PathBuf>,
    /// Number of synthetic sine-wave candles used when no file is given
    #[arg(long, default_value_t = 500)]
    synthetic: usize,
    /// Overrides `backtest.initial_capital`
    #[arg(long)]
    initial_capital: Option<Decimal>,
    /// Print the raw result as JSON instead of the report
    #[arg(long)]
    json: bool,
}

impl BacktestRunArgs {
    async fn run(&self, config: &AppConfig) -> Result<()> {
        let raw = fs::read_to_string(&self.rule)
            .with_context(|| format!("failed to read rule {}", self.rule.display()))?;
        let rule: Rule = serde_json::from_str(&raw)
            .with_context(|| format!("invalid rule in {}", self.rule.display()))?;
        let candles = match &self.candles {
            Some(path) => load_candles(path)?,
            None => {
                let start = Utc
                    .with_ymd_and_hms(2024, 1, 1, 9, 15, 0)
                    .single()
                    .context("invalid synthetic start time")?;
                synthetic_candles(self.synthetic, start)
            }
        };
        let backtest = BacktestConfig {
            initial_capital: self
                .initial_capital
                .unwrap_or(config.backtest.initial_capital),
            default_period: config.backtest.default_period,
        };
        info!(
            candles = candles.len(),
            conditions = rule.conditions.len(),
            capital = %backtest.initial_capital,
            "starting backtest"
        );
        let result = Backtester::new(backtest, &rule, &candles).run()?;
        if self.json {
            println!("{}", serde_json::to_string(&result)?);
        } else {
            print!("{result}");
        }
        Ok(())
    }
}

fn load_candles(path: &Path) -> Result<Vec<Candle>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let candles: Vec<Candle> = match extension.as_deref() {
        Some("csv") => {
            let mut reader = csv::Reader::from_path(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            let mut candles = Vec::new();
            for record in reader.deserialize::<Candle>() {
                candles.push(record.with_context(|| format!("invalid row in {}", path.display()))?);
            }
            candles
        }
        Some("json") => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("invalid candles in {}", path.display()))?
        }
        _ => bail!("unsupported candle file {}; expected .csv or .json", path.display()),
    };
    if candles.is_empty() {
        warn!(path = %path.display(), "candle file is empty; the result will be flat");
    }
    Ok(candles)
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(Some(&cli.env)).context("failed to load configuration")?;

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| match cli.verbose {
        0 => config.log_level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    });

    let log_path = match &cli.command {
        Commands::Ticker {
            action: TickerCommand::Run(args),
        } => args.resolved_log_path(&config),
        _ => None,
    };

    init_tracing(&filter, log_path.as_deref()).context("failed to initialize logging")?;

    match cli.command {
        Commands::Backtest {
            action: BacktestCommand::Run(args),
        } => args.run(&config).await?,
        Commands::Ticker {
            action: TickerCommand::Run(args),
        } => args.run(&config).await?,
    }

    Ok(())
}
