use clap::Parser;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transfer_tracker::adapters::PostgresTransactionStore;
use transfer_tracker::cli::{self, Cli, Commands, DbCommands};
use transfer_tracker::config::{Config, LogFormat};
use transfer_tracker::provider::ProviderClient;
use transfer_tracker::{create_app, db, AppSettings, AppState};

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn build_state(config: &Config, pool: PgPool) -> AppState {
    let store = Arc::new(PostgresTransactionStore::new(pool));

    let provider = Arc::new(ProviderClient::new(
        config.provider_api_url.clone(),
        config.provider_api_token.clone(),
        config.provider_timeout(),
    ));
    tracing::info!("Provider client initialized with URL: {}", config.provider_api_url);

    AppState::new(store, provider, AppSettings::from_config(config))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let state = build_state(&config, pool);
    let schedule = config.schedule()?;

    let poller = state.poller.clone();
    let batch_size = config.poll_batch_size;
    let (stop_polling, poll_shutdown) = watch::channel(false);
    let mut poll_task = tokio::spawn(async move {
        poller.run_scheduled(schedule, batch_size, poll_shutdown).await;
    });

    let broker = state.broker.clone();
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received, closing live streams");
            broker.close_all();
        })
        .await?;

    // A cycle in flight finishes, enrichments included, unless it overruns the grace period.
    let _ = stop_polling.send(true);
    let grace = config.provider_timeout() * 2;
    if tokio::time::timeout(grace, &mut poll_task).await.is_err() {
        tracing::warn!(?grace, "Poll cycle still running at shutdown, aborting");
        poll_task.abort();
    }
    tracing::info!("Server stopped");

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    init_tracing(config.log_format);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Poll { limit } => {
            let state = build_state(&config, db::create_pool(&config).await?);
            cli::handle_poll(&state, limit.unwrap_or(config.poll_batch_size)).await
        }
        Commands::Reconcile { transfer_id } => {
            let state = build_state(&config, db::create_pool(&config).await?);
            cli::handle_reconcile(&state, &transfer_id).await
        }
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config),
    }
}
