use clap::Parser;
use settlement_core::cli::{self, Cli, Commands, DbCommands};
use settlement_core::config::Config;
use settlement_core::startup::Pipeline;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config).await,
        role => {
            let pipeline = Pipeline::connect(config).await?;
            let run = async {
                match role {
                    Commands::Processor => pipeline.run_processor().await,
                    Commands::Correlator => pipeline.run_correlator().await,
                    Commands::Dispatcher => pipeline.run_dispatcher().await,
                    Commands::All => pipeline.run_all().await,
                    _ => pipeline.serve().await,
                }
            };

            tokio::select! {
                result = run => result,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received shutdown signal");
                    Ok(())
                }
            }
        }
    }
}
