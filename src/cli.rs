use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::AppState;

#[derive(Parser)]
#[command(name = "transfer-tracker")]
#[command(about = "Transfer Tracker - provider status reconciliation and live tracking", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server and the scheduled poller (default)
    Serve,

    /// Run one bulk poll cycle against the provider
    Poll {
        /// Number of recent transfers to fetch (defaults to POLL_BATCH_SIZE)
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Poll and reconcile a single provider transfer
    Reconcile {
        /// Provider transfer id
        #[arg(value_name = "TRANSFER_ID")]
        transfer_id: String,
    },

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_poll(state: &AppState, limit: u32) -> anyhow::Result<()> {
    tracing::info!(limit, "Running poll cycle...");
    let summary = state.poller.poll_recent(limit).await?;

    println!("✓ Poll cycle complete:");
    println!("  Fetched:   {}", summary.fetched);
    println!("  Created:   {}", summary.created);
    println!("  Updated:   {}", summary.updated);
    println!("  Refined:   {}", summary.refined);
    println!("  Unchanged: {}", summary.unchanged);
    println!("  Failed:    {}", summary.failed);

    Ok(())
}

pub async fn handle_reconcile(state: &AppState, transfer_id: &str) -> anyhow::Result<()> {
    crate::validation::validate_transfer_id(transfer_id)?;

    let outcome = state.poller.poll_transfer(transfer_id).await?;
    if let Some(enrichment) = outcome.enrichment {
        // Let the settlement lookup finish before the process exits.
        if let Err(e) = enrichment.await {
            tracing::warn!(transfer_id, error = %e, "Settlement enrichment task failed");
        }
    }

    println!("✓ Transfer {} reconciled ({:?})", transfer_id, outcome.action);
    println!("  Tracking code: {}", outcome.transaction.tracking_code);
    println!("  Status: {}", outcome.transaction.status);

    Ok(())
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;
    println!("✓ Database migrations completed");

    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");
    config.validate()?;

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Provider API URL: {}", config.provider_api_url);
    println!("  Provider API Token: {}", mask_secret(&config.provider_api_token));
    println!("  Webhook Secret: {}", mask_secret(&config.webhook_secret));
    println!("  Sender Name: {}", config.sender_name);
    println!("  Poll Schedule: {}", config.poll_schedule);
    println!("  Poll Batch Size: {}", config.poll_batch_size);
    println!("  Provider Timeout: {}s", config.provider_timeout_secs);
    println!("  Keep-alive Interval: {}s", config.keepalive_secs);
    println!("  Log Format: {:?}", config.log_format);

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user_start = slash_pos + 2;
                let user = &url[user_start..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}

fn mask_secret(secret: &str) -> String {
    match secret.get(..4) {
        Some(prefix) if secret.len() > 8 => format!("{}****", prefix),
        _ => "****".to_string(),
    }
}
