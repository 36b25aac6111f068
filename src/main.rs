use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webrtc_echo::bridge::SignalingBridge;
use webrtc_echo::config::{EchoConfig, TurnServer};
use webrtc_echo::engine::{EchoPeerFactory, EngineFactory};
use webrtc_echo::registry::ConnectionRegistry;
use webrtc_echo::state::AppState;
use webrtc_echo::web;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// webrtc-echo command line arguments
#[derive(Parser, Debug)]
#[command(name = "webrtc-echo")]
#[command(version, about = "WebRTC echo server: SDP offer in, echoed media and data back", long_about = None)]
struct CliArgs {
    /// Listen address
    #[arg(short = 'a', long, value_name = "ADDRESS", default_value = "0.0.0.0")]
    address: String,

    /// HTTP port
    #[arg(short = 'p', long, value_name = "PORT", default_value_t = 8080)]
    port: u16,

    /// STUN server URL (repeatable)
    #[arg(long, value_name = "URL")]
    stun: Vec<String>,

    /// TURN server as url,username,credential (repeatable)
    #[arg(long, value_name = "URL,USER,PASS")]
    turn: Vec<String>,

    /// Ceiling on one negotiation, ICE gathering included (seconds)
    #[arg(long, value_name = "SECS", default_value_t = 5)]
    timeout: u64,

    /// Maximum concurrent sessions
    #[arg(long, value_name = "N", default_value_t = 8)]
    max_sessions: usize,

    /// Disable the audio/video loopback tracks
    #[arg(long)]
    no_media: bool,

    /// Disable the data-channel echo
    #[arg(long)]
    no_datachannel: bool,

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

    tracing::info!("Starting webrtc-echo v{}", env!("CARGO_PKG_VERSION"));

    let config = EchoConfig {
        stun_servers: args.stun.clone(),
        turn_servers: parse_turn_servers(&args.turn)?,
        negotiation_timeout: Duration::from_secs(args.timeout),
        max_sessions: args.max_sessions,
        enable_media: !args.no_media,
        enable_datachannel: !args.no_datachannel,
    };
    for stun in &config.stun_servers {
        tracing::info!("Using STUN server: {}", stun);
    }
    for turn in &config.turn_servers {
        tracing::info!("Using TURN server: {:?} (user: {})", turn.urls, turn.username);
    }

    // If the engine cannot be constructed, no request could ever succeed.
    let factory = EchoPeerFactory::new(config.clone())
        .map_err(|e| anyhow::anyhow!("negotiation engine unavailable: {e}"))?;
    let factory: Arc<dyn EngineFactory> = Arc::new(factory);

    let registry = Arc::new(ConnectionRegistry::new(config.max_sessions));
    let bridge = Arc::new(SignalingBridge::new(
        Arc::clone(&factory),
        Arc::clone(&registry),
        config.negotiation_timeout,
    ));
    let state = AppState::new(config, Arc::clone(&registry), bridge);

    let app = web::create_router(state);

    let addr: SocketAddr = format!("{}:{}", args.address, args.port)
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid bind address {}:{}", args.address, args.port))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.close_all().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    tracing::info!("Shutdown signal received");
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "webrtc_echo=error,tower_http=error",
        LogLevel::Warn => "webrtc_echo=warn,tower_http=warn",
        LogLevel::Info => "webrtc_echo=info,tower_http=info",
        LogLevel::Debug => "webrtc_echo=debug,tower_http=debug",
        LogLevel::Trace => "webrtc_echo=trace,tower_http=debug,webrtc=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

fn parse_turn_servers(specs: &[String]) -> anyhow::Result<Vec<TurnServer>> {
    specs
        .iter()
        .map(|spec| {
            let mut parts = spec.splitn(3, ',');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(url), Some(user), Some(pass)) => Ok(TurnServer::new(url, user, pass)),
                _ => anyhow::bail!("invalid TURN spec \"{spec}\", expected url,username,credential"),
            }
        })
        .collect()
}
