//! Per-destination admission control for outbound calls.

pub mod circuit_breaker;
pub mod failure_policy;
pub mod registry;

pub use circuit_breaker::{BreakerConfig, BreakerError, CircuitBreaker};
pub use failure_policy::ErrorPercentage;
pub use registry::CircuitBreakerRegistry;
