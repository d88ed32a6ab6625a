//! Item service subsystem (backend side).
//!
//! # Data Flow
//! ```text
//! RPC request (rpc/server.rs or rpc/local.rs)
//!     → item.rs (validate, allocate ids, call the store)
//!     → store (RecordStore)
//!     → Item / ItemStream / Status back to the caller
//! ```
//!
//! # Design Decisions
//! - Store reachability maps to UNAVAILABLE, store faults to INTERNAL
//! - Id allocation plus insert is serialized by a single async mutex
//! - A missing store is a valid configuration: every call is UNAVAILABLE
//!   and the health check reports NOT_SERVING

pub mod item;

pub use item::{ItemService, ItemStream};
