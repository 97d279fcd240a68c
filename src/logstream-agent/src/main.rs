//! logstream-agent: runs a logging pipeline fed from stdin.
//!
//! Each input line becomes one entry. A leading level word (`ERROR ...`,
//! `[warn] ...`) sets the severity; otherwise the line is logged at info.
//! On EOF or Ctrl-C the pipeline is drained and the final metrics and
//! analytics are printed as JSON.

use anyhow::Context;
use clap::Parser;
use logstream_alerting::NewAlert;
use logstream_core::config::Profile;
use logstream_core::{AppConfig, LogContext, LogLevel};
use logstream_pipeline::Logger;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "logstream-agent")]
#[command(about = "Structured log ingestion, fanout and alerting")]
#[command(version)]
struct Cli {
    /// Service name attached to ingested lines (overrides config)
    #[arg(long, env = "LOGSTREAM__SERVICE_NAME")]
    service_name: Option<String>,

    /// Deployment profile selecting the default sinks (overrides config)
    #[arg(long, value_parser = parse_profile)]
    profile: Option<Profile>,

    /// Flush period in milliseconds (overrides config)
    #[arg(long, env = "LOGSTREAM__FLUSH__INTERVAL_MS")]
    flush_interval_ms: Option<u64>,

    /// JSON file containing a list of alert rules to register at startup
    #[arg(long)]
    alerts: Option<PathBuf>,
}

fn parse_profile(s: &str) -> Result<Profile, String> {
    match s.to_ascii_lowercase().as_str() {
        "development" | "dev" => Ok(Profile::Development),
        "production" | "prod" => Ok(Profile::Production),
        other => Err(format!("unknown profile: {other}")),
    }
}

/// Split a leading level word off a raw input line.
fn split_level(line: &str) -> (LogLevel, &str) {
    let trimmed = line.trim_start();
    let (word, rest) = trimmed
        .split_once(char::is_whitespace)
        .unwrap_or((trimmed, ""));
    let word = word.trim_start_matches('[').trim_end_matches([']', ':']);
    match word.parse::<LogLevel>() {
        Ok(level) if !rest.trim().is_empty() => (level, rest.trim_start()),
        _ => (LogLevel::Info, trimmed),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logstream=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(service_name) = cli.service_name {
        config.service_name = service_name;
    }
    if let Some(profile) = cli.profile {
        config.profile = profile;
    }
    if let Some(interval_ms) = cli.flush_interval_ms {
        config.flush.interval_ms = interval_ms;
    }

    info!(
        service = %config.service_name,
        profile = ?config.profile,
        flush_interval_ms = config.flush.interval_ms,
        sinks = config.effective_sinks().len(),
        "logstream-agent starting"
    );

    let service = config.service_name.clone();
    let logger = Logger::new(config).context("failed to build logging pipeline")?;

    if let Some(path) = cli.alerts {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read alerts from {}", path.display()))?;
        let rules: Vec<NewAlert> =
            serde_json::from_str(&raw).context("failed to parse alert rules")?;
        for rule in rules {
            let name = rule.name.clone();
            let id = logger.add_alert(rule);
            info!(alert_id = %id, name = %name, "Registered alert rule");
        }
    }

    logger.start()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    let (level, message) = split_level(&line);
                    logger.log(level, message, LogContext::new().service(service.as_str()));
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    let report = logger.shutdown().await;
    info!(
        delivered = report.delivered(),
        failed = report.failures().count(),
        "Final flush complete"
    );

    let summary = serde_json::json!({
        "metrics": logger.metrics(),
        "analytics": logger.analytics(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    info!("logstream-agent shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_level() {
        assert_eq!(split_level("ERROR db down"), (LogLevel::Error, "db down"));
        assert_eq!(split_level("[warn] slow query"), (LogLevel::Warn, "slow query"));
        assert_eq!(split_level("fatal: out of memory"), (LogLevel::Fatal, "out of memory"));
        assert_eq!(split_level("user signed in"), (LogLevel::Info, "user signed in"));
        assert_eq!(split_level("error"), (LogLevel::Info, "error"));
    }

    #[test]
    fn test_parse_profile() {
        assert_eq!(parse_profile("prod").unwrap(), Profile::Production);
        assert!(parse_profile("staging").is_err());
    }
}
