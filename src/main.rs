use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use softcat::{
    config::Config,
    database::Database,
    identicon::{HttpIdenticonGenerator, IdenticonBackfill},
    logging::{self, LogFormat},
    repositories::CatalogStore,
    web::WebServer,
};

#[derive(Parser)]
#[command(name = "softcat")]
#[command(version)]
#[command(about = "Software component catalog with background identicon generation")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "softcat.toml")]
    config: PathBuf,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Identicon generator endpoint (overrides config file)
    #[arg(short = 'g', long, value_name = "URL")]
    generator_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_tracing(&cli.log_level, cli.log_format)?;

    info!("Starting softcat v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config.display());

    // Override config with CLI arguments
    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(generator_url) = cli.generator_url {
        config.identicon.generator_url = generator_url;
        config.validate()?;
    }

    let database = Database::new(&config.database).await?;
    let store: Arc<dyn CatalogStore> = Arc::new(database);

    let generator = Arc::new(HttpIdenticonGenerator::from_config(&config.identicon)?);
    info!("Identicon generator at {}", generator.url());

    let cancellation_token = CancellationToken::new();

    let backfill = IdenticonBackfill::new(store.clone(), generator, &config.identicon);
    let backfill_token = cancellation_token.clone();
    let backfill_task = tokio::spawn(async move {
        if let Err(e) = backfill.run(backfill_token).await {
            error!("Identicon backfill failed: {}", e);
        }
    });

    let web_server = WebServer::new(&config.web, store)?;
    info!(
        "Starting web server on {}:{}",
        web_server.host(),
        web_server.port()
    );

    let signal_token = cancellation_token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let served = web_server
        .serve_with_cancellation(cancellation_token.clone())
        .await;

    // The server can also stop on its own (e.g. bind failure); take the backfill down with it.
    cancellation_token.cancel();
    if let Err(e) = backfill_task.await {
        error!("Identicon backfill task panicked: {}", e);
    }

    served?;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Failed to install signal handlers: {}", e);
                    std::future::pending::<()>().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => info!("Received SIGINT (Ctrl+C), shutting down gracefully"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down gracefully");
    }
}
