//! Sensor Hub binary.
//!
//! Serves sensor readings over HTTP, or reads sensors once from the command
//! line. GPIO pins are process-exclusive: run a single instance per board.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use sensor_hub::config::{CONFIG_FILE_ENV, DEFAULT_CONFIG_FILE};
use sensor_hub::{start_web_server, HubConfig, ReadResult, SensorHub, WebConfig};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "sensor_hub")]
#[command(about = "Sensor Hub - environmental sensors over HTTP")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    long_about = "Serves readings from sensors attached to a Raspberry Pi through a small JSON API.\n\
                  GPIO handles are process-exclusive: run exactly one instance per board."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (YAML); defaults to $CONFIG_FILE or config.yaml
    #[arg(short, long)]
    config: Option<String>,

    /// Web server bind address (overrides config and $HOST)
    #[arg(long)]
    host: Option<String>,

    /// Web server port (overrides config and $PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server (default)
    Serve(ServeArgs),

    /// List configured sensors and exit
    List,

    /// Read one sensor and exit
    Read(ReadArgs),

    /// Run a health check over all sensors and exit
    Health,
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,
}

#[derive(Args)]
struct ReadArgs {
    /// Sensor id
    sensor_id: String,

    /// Output format: json or pretty
    #[arg(short, long, default_value = "pretty")]
    format: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    let config = load_config(&cli)?;
    let hub = Arc::new(SensorHub::from_config(&config).context("Failed to build sensor registry")?);

    let outcome = match &cli.command {
        Some(Commands::Serve(args)) => serve_command(&config, args, hub.clone()).await,
        Some(Commands::List) => list_command(&hub),
        Some(Commands::Read(args)) => read_command(&hub, args).await,
        Some(Commands::Health) => health_command(&hub).await,
        None => serve_command(&config, &ServeArgs::default(), hub.clone()).await,
    };

    hub.shutdown();
    outcome
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(log_level(cli), &directives))
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn log_level(cli: &Cli) -> LevelFilter {
    if cli.debug {
        LevelFilter::DEBUG
    } else if cli.verbose {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    }
}

/// `RUST_LOG` directives on top of the level picked by the flags.
fn log_filter(level: LevelFilter, directives: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy(directives)
}

fn config_path(cli: &Cli) -> String {
    cli.config
        .clone()
        .or_else(|| std::env::var(CONFIG_FILE_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string())
}

fn load_config(cli: &Cli) -> anyhow::Result<HubConfig> {
    let path = config_path(cli);
    let mut config =
        HubConfig::load(&path).with_context(|| format!("Failed to load configuration from {}", path))?;
    config
        .apply_env_overrides()
        .context("Invalid environment override")?;

    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    info!("Loaded configuration from: {}", path);
    Ok(config)
}

async fn serve_command(
    config: &HubConfig,
    args: &ServeArgs,
    hub: Arc<SensorHub>,
) -> anyhow::Result<()> {
    info!("Starting Sensor Hub...");

    for warning in hub.warnings() {
        warn!(
            "Sensor {} will not be served: {}",
            warning.sensor_id, warning.reason
        );
    }

    let web_config = WebConfig::from_hub_config(config).with_cors(!args.no_cors);

    info!("Web server configuration:");
    info!("  - Bind address: {}", web_config.bind_address());
    info!("  - CORS enabled: {}", web_config.enable_cors);
    info!("  - Sensors: {}", hub.registry().len());
    info!(
        "  - Read policy: {} attempt(s), {}ms delay, {}ms timeout",
        config.read_policy.max_attempts,
        config.read_policy.retry_delay_ms,
        config.read_policy.attempt_timeout_ms
    );

    start_web_server(web_config, hub, shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

fn list_command(hub: &SensorHub) -> anyhow::Result<()> {
    let sensors = hub.list_sensors();
    if sensors.is_empty() {
        println!("No sensors available");
    }
    for info in &sensors {
        println!(
            "  {} ({}) - {}{}",
            info.sensor_id,
            info.sensor_type,
            info.name,
            info.pin
                .as_deref()
                .map(|pin| format!(" on pin {}", pin))
                .unwrap_or_default()
        );
    }
    for warning in hub.warnings() {
        println!("  {} unavailable: {}", warning.sensor_id, warning.reason);
    }
    Ok(())
}

async fn read_command(hub: &SensorHub, args: &ReadArgs) -> anyhow::Result<()> {
    let result = hub.read_sensor(&args.sensor_id).await?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        "pretty" => print_pretty_reading(&args.sensor_id, &result),
        other => bail!("Unsupported format: {}. Use 'json' or 'pretty'", other),
    }

    if !result.success {
        bail!("Read of sensor {} failed", args.sensor_id);
    }
    Ok(())
}

async fn health_command(hub: &SensorHub) -> anyhow::Result<()> {
    let report = hub.health().await;
    let summary = report.summary();

    println!("Status: {}", report.overall);
    for (id, result) in &report.per_sensor {
        match &result.error {
            None => println!("  {}: healthy", id),
            Some(e) => println!("  {}: unhealthy ({})", id, e),
        }
    }
    println!(
        "Total: {}, healthy: {}, unhealthy: {}",
        summary.total, summary.healthy, summary.unhealthy
    );

    if !report.is_healthy() {
        bail!("Sensor hub is {}", report.overall);
    }
    Ok(())
}

fn print_pretty_reading(sensor_id: &str, result: &ReadResult) {
    println!(
        "Sensor {} ({})",
        sensor_id,
        result.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    match (&result.data, &result.error) {
        (Some(data), _) => {
            for (key, value) in data {
                match value.as_f64() {
                    Some(number) => println!("  {}: {:.1}", key, number),
                    None => println!("  {}: {:?}", key, value),
                }
            }
        }
        (None, Some(e)) => println!("  error: {}", e),
        (None, None) => println!("  no data"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["sensor_hub", "--port", "9090", "read", "dht22_1"]).unwrap();
        assert_eq!(cli.port, Some(9090));
        match cli.command {
            Some(Commands::Read(args)) => {
                assert_eq!(args.sensor_id, "dht22_1");
                assert_eq!(args.format, "pretty");
            }
            _ => panic!("expected read command"),
        }
    }

    #[test]
    fn test_default_values() {
        let cli = Cli::try_parse_from(["sensor_hub"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
    }

    #[test]
    fn test_log_level_flags() {
        let quiet = Cli::try_parse_from(["sensor_hub"]).unwrap();
        let verbose = Cli::try_parse_from(["sensor_hub", "-v"]).unwrap();
        let debug = Cli::try_parse_from(["sensor_hub", "-d"]).unwrap();

        assert_eq!(log_level(&quiet), LevelFilter::WARN);
        assert_eq!(log_level(&verbose), LevelFilter::INFO);
        assert_eq!(log_level(&debug), LevelFilter::DEBUG);
    }

    #[test]
    fn test_log_filter_defaults_to_flag_level() {
        let filter = log_filter(LevelFilter::DEBUG, "");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));

        let filter = log_filter(LevelFilter::WARN, "sensor_hub=trace");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let cli = Cli::try_parse_from(["sensor_hub", "--config", "/etc/hub.yaml"]).unwrap();
        assert_eq!(config_path(&cli), "/etc/hub.yaml");
    }
}
