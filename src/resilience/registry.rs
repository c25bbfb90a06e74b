use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use super::circuit_breaker::{BreakerConfig, BreakerError, CircuitBreaker};

/// Process-owned map from destination (gateway id or callback host) to its breaker.
pub struct CircuitBreakerRegistry {
    config: BreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    /// Creates a registry with a breaker already configured for each destination.
    pub fn new<I, S>(config: BreakerConfig, destinations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let breakers = destinations
            .into_iter()
            .map(|d| {
                let name = d.into();
                let breaker = Arc::new(CircuitBreaker::new(name.clone(), config.clone()));
                (name, breaker)
            })
            .collect();

        Self {
            config,
            breakers: RwLock::new(breakers),
        }
    }

    pub async fn get(&self, destination: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().await.get(destination).cloned()
    }

    pub async fn get_or_register(&self, destination: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.get(destination).await {
            return breaker;
        }

        let mut breakers = self.breakers.write().await;
        breakers
            .entry(destination.to_string())
            .or_insert_with(|| {
                tracing::info!("Registering circuit breaker for {}", destination);
                Arc::new(CircuitBreaker::new(destination, self.config.clone()))
            })
            .clone()
    }

    pub async fn destinations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Runs `command` under the breaker for `destination`.
    ///
    /// Any failure, including a short circuit, bulkhead rejection or timeout,
    /// is handed to `fallback` exactly once and is not returned to the caller.
    pub async fn run<T, E, Fut, Fb, FbFut>(
        &self,
        destination: &str,
        command: Fut,
        fallback: Fb,
    ) -> Option<T>
    where
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        Fb: FnOnce(BreakerError<E>) -> FbFut,
        FbFut: Future<Output = ()>,
    {
        let breaker = self.get_or_register(destination).await;
        match breaker.call(command).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Command to {} failed: {}", destination, e);
                fallback(e).await;
                None
            }
        }
    }
}
