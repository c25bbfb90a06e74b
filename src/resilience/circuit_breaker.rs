use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{Config, Error as FailsafeError, StateMachine};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

use super::failure_policy::ErrorPercentage;

#[derive(Error, Debug)]
pub enum BreakerError<E> {
    #[error("Circuit breaker open for {0}")]
    ShortCircuited(String),

    #[error("Too many concurrent requests to {0}")]
    Rejected(String),

    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Command(E),
}

impl<E> BreakerError<E> {
    /// True when the command never reached the destination.
    pub fn is_short_circuit(&self) -> bool {
        matches!(self, BreakerError::ShortCircuited(_) | BreakerError::Rejected(_))
    }
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub timeout: Duration,
    pub max_concurrent_requests: usize,
    pub error_percent_threshold: u8,
    pub request_volume_threshold: u32,
    pub rolling_window: Duration,
    pub sleep_window: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            max_concurrent_requests: 100,
            error_percent_threshold: 25,
            request_volume_threshold: 20,
            rolling_window: Duration::from_secs(10),
            sleep_window: Duration::from_millis(5000),
        }
    }
}

/// Breaker for a single destination: timeout, bulkhead and error-percentage tripping.
///
/// A command that outlives `timeout` is dropped, which cancels the in-flight
/// request on our side. The remote end may still have acted on it.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    state: StateMachine<ErrorPercentage, ()>,
    bulkhead: Arc<Semaphore>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let policy = ErrorPercentage::new(
            config.error_percent_threshold,
            config.request_volume_threshold,
            config.rolling_window,
            config.sleep_window,
        );
        let state = Config::new().failure_policy(policy).build();
        let bulkhead = Arc::new(Semaphore::new(config.max_concurrent_requests));

        Self {
            name: name.into(),
            config,
            state,
            bulkhead,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.state.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    pub async fn call<T, E, Fut>(&self, command: Fut) -> Result<T, BreakerError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let bulkhead = self.bulkhead.clone();
        let timeout = self.config.timeout;
        let name = self.name.clone();

        let guarded = async move {
            let _permit = match bulkhead.try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => return Err(BreakerError::Rejected(name)),
            };

            match tokio::time::timeout(timeout, command).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(BreakerError::Command(e)),
                Err(_) => Err(BreakerError::Timeout(timeout)),
            }
        };

        match self.state.call(guarded).await {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(BreakerError::ShortCircuited(self.name.clone())),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}
