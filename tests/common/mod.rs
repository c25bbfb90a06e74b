#![allow(dead_code)]

use bigdecimal::BigDecimal;
use settlement_core::adapters::InMemoryTransactionRepository;
use settlement_core::config::Config;
use settlement_core::domain::{Transaction, TransactionType};
use settlement_core::lock::{DistributedLock, InMemoryLock};
use settlement_core::queue::InMemoryBus;
use settlement_core::startup::Pipeline;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub struct Harness {
    pub repository: InMemoryTransactionRepository,
    pub bus: InMemoryBus,
    pub pipeline: Pipeline,
}

/// Test configuration: fast backoff and lock polling, plus `overrides`.
pub fn config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("DATABASE_URL", "postgres://localhost:5432/unused"),
        ("BACKOFF_BASE_MS", "1"),
        ("LOCK_RETRY_DELAY_MS", "5"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }

    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub fn harness(overrides: &[(&str, &str)]) -> Harness {
    let config = config(overrides);
    let lock = Arc::new(InMemoryLock::new(config.lock_settings()));
    harness_with_lock(config, lock)
}

pub fn harness_with_lock(config: Config, lock: Arc<dyn DistributedLock>) -> Harness {
    let repository = InMemoryTransactionRepository::default();
    let bus = InMemoryBus::new();
    let pipeline = Pipeline::new(
        config,
        Arc::new(bus.clone()),
        Arc::new(repository.clone()),
        lock,
    );

    Harness {
        repository,
        bus,
        pipeline,
    }
}

pub fn deposit(id: &str, gateway: &str, client_callback: Option<&str>) -> Transaction {
    Transaction::new(
        TransactionType::Deposit,
        "234556780987".to_string(),
        "user-1".to_string(),
        gateway.to_string(),
        BigDecimal::from(100),
        "USD".to_string(),
        client_callback.map(str::to_string),
    )
    .with_id(id)
}

/// Polls `check` until it holds or roughly five seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
