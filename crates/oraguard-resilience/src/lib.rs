//! Failure containment for the gateway: request rate limiting and a
//! circuit breaker around the downstream database path.

mod breaker;
mod rate_limit;

pub use breaker::{
    BreakerConfig, BreakerError, BreakerSnapshot, CircuitBreaker, CircuitState,
};
pub use rate_limit::{RateLimitConfig, RateLimiter};
