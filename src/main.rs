use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::TurnstileConfig;
use turnstile::http::{shutdown_signal, HttpServer};
use turnstile::ratelimit::{IdleSweeper, RateLimiter, RuleSet};

/// Sliding window rate limiting in front of HTTP resources.
#[derive(Parser, Debug)]
#[command(name = "turnstile", version)]
struct Args {
    /// Path to the service configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,

    /// Path to the rate limit rules file (YAML); overrides the config file
    #[arg(short, long)]
    rules: Option<String>,

    /// Address to listen on; overrides the config file
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .init(),
    }

    info!("Starting Turnstile");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => TurnstileConfig::from_file(path)?,
        None => TurnstileConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    if let Some(rules) = args.rules {
        config.rate_limiting.rules_path = Some(rules);
    }
    info!(listen_addr = %config.server.listen_addr, "Configuration loaded");

    let rule_set = match &config.rate_limiting.rules_path {
        Some(path) => RuleSet::from_file(path)?,
        None => RuleSet::default(),
    };
    let registry = Arc::new(rule_set.build_registry()?);
    info!(
        default_limit = registry.default_rule().limit(),
        default_window = ?registry.default_rule().window(),
        rules = registry.rule_count(),
        "Rate limit rules loaded"
    );

    let rate_limiter = Arc::new(RateLimiter::new(registry));
    let sweeper = IdleSweeper::spawn(
        rate_limiter.clone(),
        config.rate_limiting.sweep_config()?,
    );

    let server = HttpServer::new(config.server.listen_addr, rate_limiter);
    let result = server.serve_with_shutdown(shutdown_signal()).await;

    sweeper.stop();
    result?;

    info!("Turnstile stopped");
    Ok(())
}
