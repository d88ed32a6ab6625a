//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway operation:
//!     → retries.rs (attempt loop, backoff from backoff.rs)
//!     → circuit_breaker.rs (admit or reject, record outcome)
//!     → timeouts.rs (per-call deadline on the channel)
//!     → ItemChannel
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every RPC carries a deadline
//! - Retries only for transport failures, and only where repeating is safe
//! - Each retry attempt passes through the breaker, so an opening breaker
//!   stops the retry loop
//! - Composition is explicit function calls, not middleware

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitState, Transition};
pub use retries::{execute, RetryOn, RetryPolicy};
