//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Connection monitor (monitor.rs):
//!     Periodic timer
//!     → Probe the current channel
//!     → On failure: build a new channel, swap it into the ChannelRef
//!
//! Health report (report.rs):
//!     GET /health
//!     → Probe channel + backend health check (short deadline)
//!     → Breaker snapshot
//!     → JSON report
//! ```
//!
//! # Design Decisions
//! - Probes never go through the breaker
//! - NOT_FOUND from a probe still means the peer is reachable
//! - The monitor is a single task tied to the shutdown signal

pub mod monitor;
pub mod report;

pub use monitor::{ConnectionMonitor, ProbeOutcome};
pub use report::{aggregate, HealthReport, ServiceIdentity};
