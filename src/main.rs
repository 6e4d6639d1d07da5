//! http-replay
//!
//! Replays a capture file of framed HTTP requests against a target.
//!
//! ```text
//!   capture file ──split──▶ HttpOutput::write ──▶ sender pool ──▶ target
//!                                                     │
//!                             result.tsv ◀────────────┤
//!                             response log ◀──────────┘ (--track-responses)
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncReadExt;

use http_replay::config::validation::validate_config;
use http_replay::config::{load_config, ReplayConfig};
use http_replay::observability::{logging, metrics};
use http_replay::{payload, HttpOutput};

#[derive(Parser)]
#[command(name = "http-replay")]
#[command(about = "Replay captured HTTP requests against a target", long_about = None)]
struct Cli {
    /// Target address, "host:port" or "http://host:port"
    #[arg(short, long)]
    target: Option<String>,

    /// Capture file, or "-" for stdin
    #[arg(short, long)]
    input: String,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fixed number of senders (0 = dynamic pool)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Log replayed responses
    #[arg(long)]
    track_responses: bool,

    /// Seconds to wait for in-flight requests on exit
    #[arg(long, default_value_t = 30)]
    grace_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ReplayConfig::default(),
    };
    if let Some(target) = cli.target {
        config.target = target;
    }
    if let Some(workers) = cli.workers {
        config.output.workers = workers;
    }
    if cli.track_responses {
        config.output.track_responses = true;
    }
    if let Err(errors) = validate_config(&config) {
        for e in &errors {
            eprintln!("config error: {}", e);
        }
        return Err("invalid configuration".into());
    }

    if config.output.debug {
        logging::init("debug");
    } else {
        logging::init(&config.observability.log_level);
    }
    tracing::info!("http-replay v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let capture = read_input(&cli.input).await?;
    let payloads = payload::split_capture(&capture);
    tracing::info!(input = %cli.input, payloads = payloads.len(), "Capture loaded");

    let output = HttpOutput::new(&config.target, config.output)?;
    tracing::info!(target_url = %output.address(), "{}", output);

    let reader = output.config().track_responses.then(|| {
        let responses = output.responses();
        tokio::spawn(async move {
            let mut logged = 0u64;
            while let Ok(response) = responses.recv().await {
                let status = payload::response_status(&response.payload);
                tracing::info!(
                    id = %String::from_utf8_lossy(&response.id),
                    status = ?status,
                    rtt_ms = response.round_trip.as_millis() as u64,
                    "Replayed response"
                );
                logged += 1;
            }
            logged
        })
    });

    for request in &payloads {
        output.write(request).await?;
    }
    tracing::info!(
        written = payloads.len(),
        peak_workers = output.peak_workers(),
        "Capture replayed, draining"
    );

    // The reader ends on its own once the drained senders have stopped.
    let rows = output.shutdown(Duration::from_secs(cli.grace_secs)).await?;
    if let Some(reader) = reader {
        let responses = reader.await?;
        tracing::info!(responses, "Response log complete");
    }

    tracing::info!(rows, "Shutdown complete");
    Ok(())
}

async fn read_input(input: &str) -> std::io::Result<Vec<u8>> {
    if input == "-" {
        let mut buf = Vec::new();
        tokio::io::stdin().read_to_end(&mut buf).await?;
        Ok(buf)
    } else {
        tokio::fs::read(input).await
    }
}
