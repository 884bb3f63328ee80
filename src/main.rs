//! Mock Dispatch - CLI Entry Point
//!
//! Loads an expectation file and dispatches requests given on the command
//! line against it, printing each response.

use anyhow::{Context, Result};
use clap::Parser;
use mock_dispatch::{MockConfig, MockDispatcher, MockResponse, RawRequest};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "mock-dispatch",
    about = "Mock HTTP dispatcher - load expectations and dry-run requests against them",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mock-dispatch.yaml")]
    config: PathBuf,

    /// Fixture directory (overrides settings.fixtures_dir)
    #[arg(short, long)]
    fixtures: Option<PathBuf>,

    /// Request to dispatch, as "METHOD TARGET" (repeatable, dispatched in order)
    #[arg(short, long = "request", value_name = "REQUEST")]
    requests: Vec<String>,

    /// Header added to every request, as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    headers: Vec<String>,

    /// Body sent with every request
    #[arg(short, long)]
    body: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        let default_config = include_str!("../demos/default-config.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    let mut config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration (no expectations)");
        MockConfig::default()
    };

    if let Some(dir) = args.fixtures {
        config.settings.fixtures_dir = Some(dir);
    }

    let dispatcher = MockDispatcher::from_config(&config).await?;

    if args.validate {
        println!(
            "Configuration is valid ({} expectations, {} registrations)",
            config.expectations.len(),
            dispatcher.pending().await
        );
        return Ok(());
    }

    for request in &args.requests {
        let raw = parse_request(request, &args.headers, args.body.as_deref())?;
        let response = dispatcher.dispatch(&raw).await?;
        print_response(request, &response);
    }

    println!(
        "{} request(s) dispatched, {} expectation(s) pending",
        dispatcher.all_dispatched().await.len(),
        dispatcher.pending().await
    );
    Ok(())
}

fn parse_request(request: &str, headers: &[String], body: Option<&str>) -> Result<RawRequest> {
    let (method, target) = request
        .trim()
        .split_once(char::is_whitespace)
        .with_context(|| format!("Request must be \"METHOD TARGET\", got {:?}", request))?;

    let mut raw = RawRequest::new(method, target.trim());
    for header in headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("Header must be \"Name: value\", got {:?}", header))?;
        raw = raw.header(name.trim(), value.trim());
    }
    if let Some(body) = body {
        raw = raw.body(body);
    }
    Ok(raw)
}

fn print_response(request: &str, response: &MockResponse) {
    println!("> {}", request);
    println!("< {}", response.status);
    for (name, value) in &response.headers {
        println!("< {}: {}", name, value);
    }
    if let Some(throttle) = &response.throttle {
        println!(
            "< (throttled: {} bytes per {:?}, {:?} total)",
            throttle.bytes_per_period,
            throttle.period,
            throttle.delivery_time(response.body.len())
        );
    }
    println!();
    println!("{}", response.body_text());
    println!();
}
