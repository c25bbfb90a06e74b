use clap::{Parser, Subcommand};
use crate::config::Config;

#[derive(Parser)]
#[command(name = "settlement-core")]
#[command(about = "Settlement Core - asynchronous payment gateway settlement pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the callback intake HTTP server (default)
    Serve,

    /// Consume the transaction topic and submit transactions to gateways
    Processor,

    /// Consume gateway callbacks and settle transactions
    Correlator,

    /// Deliver final outcomes to client callback URLs
    Dispatcher,

    /// Run every role in one process
    All,

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

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    println!("✓ Database migrations completed");
    Ok(())
}

pub async fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Redis URL: {}", mask_password(&config.redis_url));
    println!("  Consumer Name: {}", config.consumer_name);
    println!("  Callback Prefix: {}", config.callback_prefix);
    println!("  Gateway A URL: {}", config.gateway_a_url);
    println!("  Gateway B URL: {}", config.gateway_b_url);
    println!(
        "  Topics: {} / {} / {}",
        config.transaction_topic, config.callback_topic, config.dispatcher_topic
    );
    println!("  Max Gateway Retries: {}", config.max_gateway_retries);

    let report = crate::startup::validate_environment(config).await;
    report.print();

    if !report.is_valid() {
        anyhow::bail!("Configuration is invalid");
    }

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");
    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
