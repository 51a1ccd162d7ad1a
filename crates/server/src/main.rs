use clap::Parser;
use tracing::info;

use breachsim_episode::{Episode, EpisodeConfig};
use breachsim_server::{AppState, ServerError, router};

/// Breachsim HTTP server.
#[derive(Parser, Debug)]
#[command(name = "breachsim-server", about = "Episodic incident-response simulator")]
struct Cli {
    /// Bind host.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Bind port.
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Override the scenario seed path (defaults to SEED_PATH).
    #[arg(long)]
    seed: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = EpisodeConfig::from_env()?;
    if let Some(seed) = cli.seed {
        config.seed_path = seed.into();
    }
    info!(seed = %config.seed_path.display(), "loading scenario");
    let episode = Episode::from_config(config)?;

    let app = router(AppState::new(episode));
    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "breachsim-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("breachsim-server shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful
/// shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
