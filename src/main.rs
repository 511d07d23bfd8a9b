use clap::Parser;
use drift_physics::config::Config;
use drift_physics::net::start_websocket_server;
use drift_physics::scene::{BuiltinScene, MeshSource, SceneFile};
use drift_physics::state::SharedGameState;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration, Instant};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Headless drift-physics server
#[derive(Parser, Debug)]
#[command(name = "drift-server", version, about)]
struct Cli {
    /// TOML config; built-in tuning when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides `server.bind`
    #[arg(short, long)]
    bind: Option<String>,

    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("drift-server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    let source: Arc<dyn MeshSource> = match &config.server.scene {
        Some(path) => Arc::new(SceneFile::new(path)),
        None => Arc::new(BuiltinScene),
    };
    let bind = config.server.bind.clone();
    let frame_interval = Duration::from_millis(config.server.frame_interval_ms.max(1));
    let state = Arc::new(Mutex::new(SharedGameState::new(config)));

    // Start WebSocket server
    let server = tokio::spawn(start_websocket_server(Arc::clone(&state), source, bind));

    // Render-style ticker: real frame deltas feed each session's scheduler.
    let mut ticker = interval(frame_interval);
    let mut last = Instant::now();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                let delta = now.duration_since(last).as_secs_f32();
                last = now;

                let mut game = state.lock().await;
                game.frame_all(delta);
                game.broadcast_snapshot();
            }
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            }
        }
        if server.is_finished() {
            break;
        }
    }

    if server.is_finished() {
        match server.await {
            Ok(Err(e)) => {
                error!(error = %e, "websocket server stopped");
                return Err(e.into());
            }
            Err(e) => {
                error!(error = %e, "websocket server task failed");
                return Err(e.into());
            }
            Ok(Ok(())) => {}
        }
    } else {
        server.abort();
    }
    Ok(())
}
