//! RPC subsystem: the wire between gateway and item service.
//!
//! # Data Flow
//! ```text
//! Gateway
//!     → channel.rs (ItemChannel snapshot from the ChannelRef)
//!     → client.rs (JSON over HTTP, per-call deadline, size limits)
//!     → server.rs (axum routes on the item service)
//!     → service::ItemService
//!
//! In-process (tests, embedding):
//!     → local.rs (direct calls, same deadline semantics)
//! ```
//!
//! # Wire Format
//! - Unary: `POST /<Service>/<Method>` with a JSON message; 200 carries the
//!   response message, anything else a JSON `Status`
//! - Server streaming: newline-delimited `StreamFrame`s; an error frame is
//!   always the last one
//!
//! # Design Decisions
//! - Channels connect lazily; a dead peer shows up as UNAVAILABLE
//! - Replacement of the current channel is a single atomic swap

pub mod channel;
pub mod client;
pub mod local;
pub mod server;
pub mod status;

use serde::{Deserialize, Serialize};

use crate::model::Item;

pub use channel::{probe, ChannelRef, ChannelSlot, Connector, ItemChannel};
pub use client::{HttpChannel, HttpConnector};
pub use local::{LocalChannel, LocalConnector};
pub use server::RpcServer;
pub use status::{Code, Status};

/// Method paths.
pub mod methods {
    pub const GET_ITEM_BY_ID: &str = "/ItemService/GetItemById";
    pub const LIST_ALL_ITEMS: &str = "/ItemService/ListAllItems";
    pub const ADD_ITEM: &str = "/ItemService/AddItem";
    pub const HEALTH_CHECK: &str = "/Health/Check";
}

/// Content type of server-streaming responses.
pub const STREAM_CONTENT_TYPE: &str = "application/x-ndjson";

/// One line of a server-streaming response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamFrame {
    Item(Item),
    Error(Status),
}
