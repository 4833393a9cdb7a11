//! `zeng ticker run`: the engine wired to stdin/stdout.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use rust_decimal::Decimal;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use zeng_broker::NetworkConnector;
use zeng_config::AppConfig;
use zeng_core::FeedSpec;
use zeng_ticker::protocol::ConnectRequest;
use zeng_ticker::{spawn_ticker, Command, EngineConfig, HostMessage, RiskLimits};

use crate::telemetry::spawn_metrics_server;

#[derive(Args)]
pub struct TickerRunArgs {
    /// Feed to open on start, as `kind:BROKER:url` (e.g. `ws:UPSTOX:wss://host/feed`)
    #[arg(long = "feed", value_name = "FEED")]
    feeds: Vec<FeedSpec>,
    /// Overrides `risk.max_loss`
    #[arg(long, allow_hyphen_values = true)]
    max_loss: Option<Decimal>,
    /// Prefix for path-only push-stream URLs; overrides `ticker.origin`
    #[arg(long)]
    origin: Option<String>,
    /// Serve Prometheus metrics on this address (defaults to `ticker.metrics_addr`)
    #[arg(long)]
    metrics_addr: Option<String>,
    /// Expose the Prometheus endpoint
    #[arg(long)]
    metrics: bool,
    /// Also write JSON logs to this file (defaults to `log_path`)
    #[arg(long)]
    log_path: Option<PathBuf>,
}

impl TickerRunArgs {
    pub fn resolved_log_path(&self, config: &AppConfig) -> Option<PathBuf> {
        self.log_path.clone().or_else(|| config.log_path.clone())
    }

    fn engine_config(&self, config: &AppConfig) -> EngineConfig {
        let ticker = &config.ticker;
        EngineConfig {
            reconnect_interval: Duration::from_millis(ticker.reconnect_interval_ms),
            lag_threshold: Duration::from_millis(ticker.lag_threshold_ms),
            history_capacity: ticker.history_capacity,
            metrics_interval: Duration::from_secs(ticker.metrics_interval_secs.max(1)),
            risk: RiskLimits {
                max_loss: self.max_loss.unwrap_or(config.risk.max_loss),
                max_trades: config.risk.max_trades,
            },
        }
    }

    pub async fn run(&self, config: &AppConfig) -> Result<()> {
        let mut connector = NetworkConnector::new()?;
        if let Some(origin) = self.origin.clone().or_else(|| config.ticker.origin.clone()) {
            connector = connector.with_origin(origin);
        }
        let mut handle = spawn_ticker(self.engine_config(config), Arc::new(connector))?;

        let metrics_task = if self.metrics {
            let raw = self
                .metrics_addr
                .clone()
                .unwrap_or_else(|| config.ticker.metrics_addr.clone());
            let addr: SocketAddr = raw
                .parse()
                .with_context(|| format!("invalid metrics address '{raw}'"))?;
            Some(spawn_metrics_server(handle.metrics().registry(), addr))
        } else {
            None
        };

        let feeds = config
            .feeds
            .iter()
            .map(|feed| feed.to_spec())
            .chain(self.feeds.iter().cloned());
        for spec in feeds {
            info!(url = %spec.url, kind = %spec.kind, broker = %spec.broker, "subscribing feed");
            handle.send(Command::Connect(ConnectRequest {
                url: spec.url,
                kind: spec.kind,
                broker: Some(spec.broker),
            }))?;
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut accepting = true;

        loop {
            tokio::select! {
                line = lines.next_line(), if accepting => match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<HostMessage>(line) {
                            Ok(message) => handle.send(message)?,
                            Err(err) => warn!(error = %err, "ignoring malformed host message"),
                        }
                    }
                    Ok(None) => {
                        info!("stdin closed; stopping ticker");
                        accepting = false;
                        handle.close();
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to read stdin; stopping ticker");
                        accepting = false;
                        handle.close();
                    }
                },
                _ = &mut ctrl_c, if accepting => {
                    info!("interrupt received; stopping ticker");
                    accepting = false;
                    handle.close();
                }
                event = handle.next_event() => match event {
                    Some(event) => {
                        let mut line = serde_json::to_string(&event)?;
                        line.push('\n');
                        stdout.write_all(line.as_bytes()).await?;
                        stdout.flush().await?;
                    }
                    None => break,
                },
            }
        }

        if let Some(task) = metrics_task {
            task.abort();
        }
        Ok(())
    }
}
