use clap::Parser;
use statsstore::config::AppConfig;
use statsstore::storage::{self, NewStoreOptions, Store};
use statsstore::visitor::Visitor;
use statsstore::{app, pipeline};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "statsstore", about = "Self-hosted visitor analytics store")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "statsstore=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(Some(&cli.config))?;

    if let Err(msg) = config.validate() {
        eprintln!("Configuration error: {msg}");
        return Err(msg.into());
    }

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        db = %config.database.path.display(),
        table = %config.database.visitor_table_name,
        "starting statsstore"
    );

    // Setup SQLite pool
    let pool = storage::sqlite::create_pool(&config.database)?;
    storage::sqlite::init_pool(&pool).await?;

    let store = Arc::new(
        Store::new(NewStoreOptions {
            visitor_table_name: config.database.visitor_table_name.clone(),
            pool,
            automigrate_enabled: config.database.automigrate,
            debug_enabled: config.database.debug,
        })
        .await?,
    );
    tracing::info!("database initialized");

    // Setup MPSC channel
    let (tx, rx) = mpsc::channel::<Visitor>(config.ingest.channel_capacity);

    // Spawn write-behind worker
    let worker_store = store.clone();
    let ingest_config = config.ingest.clone();
    let worker_handle = tokio::spawn(async move {
        pipeline::worker::run_worker(rx, worker_store, ingest_config).await;
    });

    // Spawn retention background task
    if config.retention.soft_deleted_days > 0 {
        let retention_store = store.clone();
        let retention_days = config.retention.soft_deleted_days;
        let retention_interval = config.retention.prune_interval_secs;
        tokio::spawn(async move {
            storage::retention::retention_loop(retention_store, retention_days, retention_interval)
                .await;
        });
    }

    let router = app::build_router(&config, store, tx.clone());

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // The router's senders are gone with the server; dropping the last one
    // lets the worker drain what is buffered.
    drop(tx);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(10), worker_handle).await;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }

    tracing::info!("shutting down...");
}
