use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use screenbridge::adb::AdbInvoker;
use screenbridge::config::CaptureConfig;
use screenbridge::state::AppState;
use screenbridge::web;

/// Log level for the gateway process.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// screenbridge command line arguments.
#[derive(Parser, Debug)]
#[command(name = "screenbridge")]
#[command(version, about = "Multi-device Android screen-mirroring and control gateway", long_about = None)]
struct CliArgs {
    /// Listen address
    #[arg(short = 'a', long, value_name = "ADDRESS", default_value = "0.0.0.0")]
    address: String,

    /// HTTP port
    #[arg(short = 'p', long, value_name = "PORT", default_value_t = 8765)]
    port: u16,

    /// Path to the adb executable (defaults to relying on PATH)
    #[arg(long, value_name = "PATH", default_value = "adb")]
    adb_path: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting screenbridge v{}", env!("CARGO_PKG_VERSION"));

    let capture_cfg = CaptureConfig::from_env();
    tracing::info!(
        bitrate = capture_cfg.bitrate,
        size = %capture_cfg.size,
        "capture parameters"
    );

    let adb = Arc::new(AdbInvoker::with_default_backend(args.adb_path.clone()));
    let state = AppState::new(adb, capture_cfg);

    let app = web::create_router(state);

    let ip: IpAddr = args
        .address
        .parse()
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let addr = SocketAddr::new(ip, args.port);
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        tracing::info!("Shutdown signal received");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initialize logging with tracing, CLI level overridable by `-v`
/// repetition and, with highest priority, `RUST_LOG`.
fn init_logging(level: LogLevel, verbose_count: u8) {
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "screenbridge=error,tower_http=error",
        LogLevel::Warn => "screenbridge=warn,tower_http=warn",
        LogLevel::Info => "screenbridge=info,tower_http=info",
        LogLevel::Debug => "screenbridge=debug,tower_http=debug",
        LogLevel::Trace => "screenbridge=trace,tower_http=debug",
    };

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {err}");
    }
}
