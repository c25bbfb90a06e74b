use crate::adapters::PostgresTransactionRepository;
use crate::config::Config;
use crate::gateways::{GatewayA, GatewayB, GatewayRegistry};
use crate::handlers::{create_router, ApiState};
use crate::lock::{DistributedLock, RedisLock};
use crate::ports::TransactionRepository;
use crate::queue::{run_consumer, MessageBus, MessageHandler, RedisStreamBus};
use crate::resilience::CircuitBreakerRegistry;
use crate::services::{CallbackCorrelator, CallbackDispatcher, RetryScheduler, TransactionProcessor};
use anyhow::{Context, Result};
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub const GATEWAY_A: &str = "a";
pub const GATEWAY_B: &str = "b";

pub const PROCESSOR_GROUP: &str = "payment-processor";
pub const CORRELATOR_GROUP: &str = "callback-processor";
pub const DISPATCHER_GROUP: &str = "callback-dispatcher";

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub redis: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.redis
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("Redis Connectivity:    {}", status(self.redis));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(config: &Config) -> ValidationReport {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        redis: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_database(config).await {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    if let Err(e) = validate_redis(&config.redis_url).await {
        report.redis = false;
        report.errors.push(format!("Redis: {}", e));
    }

    report
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.redis_url.is_empty() {
        anyhow::bail!("REDIS_URL is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }

    for (key, value) in [
        ("API_CALLBACK_PREFIX", &config.callback_prefix),
        ("GATEWAY_A_URL", &config.gateway_a_url),
        ("GATEWAY_B_URL", &config.gateway_b_url),
    ] {
        url::Url::parse(value).with_context(|| format!("{} is not a valid URL", key))?;
    }

    Ok(())
}

async fn validate_database(config: &Config) -> Result<()> {
    let pool = crate::db::create_pool(config)
        .await
        .context("Failed to connect to database")?;

    sqlx::query("SELECT 1")
        .fetch_one(&pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(&pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

async fn validate_redis(redis_url: &str) -> Result<()> {
    let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;

    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .context("Failed to connect to Redis")?;

    redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await
        .context("Redis PING failed")?;

    Ok(())
}

pub fn build_gateways(config: &Config) -> GatewayRegistry {
    GatewayRegistry::new()
        .with(
            GATEWAY_A,
            Arc::new(GatewayA::new(
                config.gateway_a_url.clone(),
                config.gateway_a_deposit_path.clone(),
                config.gateway_a_withdraw_path.clone(),
                config.callback_prefix.clone(),
            )),
        )
        .with(
            GATEWAY_B,
            Arc::new(GatewayB::new(
                config.gateway_b_url.clone(),
                config.callback_prefix.clone(),
            )),
        )
}

/// Connected collaborators shared by every process role.
#[derive(Clone)]
pub struct Pipeline {
    pub config: Config,
    pub bus: Arc<dyn MessageBus>,
    pub repository: Arc<dyn TransactionRepository>,
    pub lock: Arc<dyn DistributedLock>,
    pub gateways: GatewayRegistry,
    pub gateway_breakers: Arc<CircuitBreakerRegistry>,
    pub dispatch_breakers: Arc<CircuitBreakerRegistry>,
}

impl Pipeline {
    pub async fn connect(config: Config) -> Result<Self> {
        let pool: PgPool = crate::db::create_pool(&config).await?;
        let repository = Arc::new(PostgresTransactionRepository::new(pool));
        let lock = Arc::new(RedisLock::new(&config.redis_url, config.lock_settings())?);
        let bus = Arc::new(RedisStreamBus::new(&config.redis_url, &config.consumer_name)?);
        tracing::info!("Connected to Postgres and Redis");

        Ok(Self::new(config, bus, repository, lock))
    }

    pub fn new(
        config: Config,
        bus: Arc<dyn MessageBus>,
        repository: Arc<dyn TransactionRepository>,
        lock: Arc<dyn DistributedLock>,
    ) -> Self {
        let gateways = build_gateways(&config);
        let gateway_breakers = Arc::new(CircuitBreakerRegistry::new(
            config.breaker_config(),
            gateways.ids(),
        ));
        let dispatch_breakers = Arc::new(CircuitBreakerRegistry::new(
            config.breaker_config(),
            Vec::<String>::new(),
        ));

        Self {
            config,
            bus,
            repository,
            lock,
            gateways,
            gateway_breakers,
            dispatch_breakers,
        }
    }

    pub fn processor(&self) -> TransactionProcessor {
        TransactionProcessor::new(
            self.repository.clone(),
            self.lock.clone(),
            self.gateways.clone(),
            self.gateway_breakers.clone(),
            RetryScheduler::new(
                self.bus.clone(),
                self.config.transaction_topic.clone(),
                self.config.backoff_base,
                self.config.max_gateway_retries,
            ),
        )
    }

    pub fn correlator(&self) -> CallbackCorrelator {
        CallbackCorrelator::new(
            self.repository.clone(),
            self.lock.clone(),
            self.gateways.clone(),
            self.bus.clone(),
            self.config.transaction_topic.clone(),
            self.config.dispatcher_topic.clone(),
        )
    }

    pub fn dispatcher(&self) -> CallbackDispatcher {
        CallbackDispatcher::new(
            self.dispatch_breakers.clone(),
            self.config.dispatch_signing_secret.clone(),
        )
    }

    pub async fn serve(&self) -> Result<()> {
        let app = create_router(ApiState {
            bus: self.bus.clone(),
            callback_topic: self.config.callback_topic.clone(),
        });

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.server_port));
        tracing::info!("listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }

    pub async fn run_processor(&self) -> Result<()> {
        let handler: Arc<dyn MessageHandler> = Arc::new(self.processor());
        self.consume(&self.config.transaction_topic, PROCESSOR_GROUP, handler).await
    }

    pub async fn run_correlator(&self) -> Result<()> {
        let handler: Arc<dyn MessageHandler> = Arc::new(self.correlator());
        self.consume(&self.config.callback_topic, CORRELATOR_GROUP, handler).await
    }

    pub async fn run_dispatcher(&self) -> Result<()> {
        let handler: Arc<dyn MessageHandler> = Arc::new(self.dispatcher());
        self.consume(&self.config.dispatcher_topic, DISPATCHER_GROUP, handler).await
    }

    /// Every role in one process.
    pub async fn run_all(&self) -> Result<()> {
        tokio::try_join!(
            self.serve(),
            self.run_processor(),
            self.run_correlator(),
            self.run_dispatcher(),
        )?;
        Ok(())
    }

    async fn consume(
        &self,
        topic: &str,
        group: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        run_consumer(self.bus.clone(), topic, group, handler)
            .await
            .with_context(|| format!("consumer for {} stopped", topic))
    }
}
