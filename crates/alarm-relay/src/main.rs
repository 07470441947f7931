//! alarm-relay - CloudWatch alarm to Teams relay
//!
//! Reads an SNS event, delivers each alarm as an adaptive card and prints the
//! batch response.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use alarm_relay::config::parse_timeout_seconds;
use alarm_relay::event::message_id;
use alarm_relay::{AlarmRelay, RelayConfig, ReqwestTransport, SnsEvent};
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use relay_secrets::{FileSecretSource, MemorySecretSource};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "alarm-relay")]
#[command(about = "Relay CloudWatch alarm notifications to a Teams webhook")]
#[command(version)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Deliver every record of an SNS event and print the response
    Process {
        /// SNS event JSON file, or `-` for stdin
        #[arg(long, default_value = "-")]
        event: String,

        /// JSON file mapping secret names to values
        #[arg(long, env = "ALARM_RELAY_SECRETS_FILE")]
        secrets_file: PathBuf,

        /// Name of the secret holding the webhook URL [default: $WEBHOOK_URL_SECRET_NAME]
        #[arg(long)]
        secret_name: Option<String>,

        /// Default region for alarms without one [default: $AWS_REGION]
        #[arg(long)]
        region: Option<String>,

        /// Per-request delivery timeout in seconds [default: $TIMEOUT_SECONDS, else 10]
        #[arg(long)]
        timeout_seconds: Option<String>,
    },

    /// Print the card for every record without delivering anything
    Render {
        /// SNS event JSON file, or `-` for stdin
        #[arg(long, default_value = "-")]
        event: String,

        /// Default region for alarms without one [default: $AWS_REGION]
        #[arg(long)]
        region: Option<String>,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    match cli.command {
        Commands::Process {
            event,
            secrets_file,
            secret_name,
            region,
            timeout_seconds,
        } => {
            let mut config = RelayConfig::from_env();
            if let Some(name) = secret_name {
                config.webhook_secret_name = name;
            }
            if let Some(region) = region {
                config.region = region;
            }
            if let Some(raw) = timeout_seconds {
                config = config.with_timeout(Duration::from_secs(parse_timeout_seconds(Some(&raw))));
            }
            process(&event, &secrets_file, config)
        }
        Commands::Render { event, region } => {
            let mut config = RelayConfig::from_env();
            if let Some(region) = region {
                config.region = region;
            }
            render(&event, config)
        }
    }
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("alarm_relay=info".parse()?);
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries the response.
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
    Ok(())
}

fn read_event(source: &str) -> anyhow::Result<SnsEvent> {
    let text = if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read SNS event from stdin")?;
        text
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("failed to read SNS event from {source}"))?
    };
    Ok(SnsEvent::from_json(&text)?)
}

fn process(source: &str, secrets_file: &Path, config: RelayConfig) -> anyhow::Result<ExitCode> {
    let event = read_event(source)?;
    info!(records = event.records.len(), "processing SNS event");

    let transport = ReqwestTransport::new().context("failed to build HTTP client")?;
    let relay = AlarmRelay::new(
        config,
        Arc::new(FileSecretSource::new(secrets_file)),
        Arc::new(transport),
    );

    let response = relay.handle_event(&event);
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(if response.status_code == 200 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn render(source: &str, config: RelayConfig) -> anyhow::Result<ExitCode> {
    let event = read_event(source)?;

    // Rendering never resolves credentials or sends requests.
    let transport = ReqwestTransport::new().context("failed to build HTTP client")?;
    let relay = AlarmRelay::new(
        config,
        Arc::new(MemorySecretSource::new()),
        Arc::new(transport),
    );

    let mut failed = false;
    let rendered: Vec<_> = event
        .records
        .iter()
        .map(|record| {
            let id = message_id(record);
            match relay.render(record) {
                Ok(card) => json!({ "message_id": id, "card": card }),
                Err(e) => {
                    failed = true;
                    json!({ "message_id": id, "error": e.to_string() })
                }
            }
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
