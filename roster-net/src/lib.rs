//! Network layer for the roster control plane.
//!
//! This crate provides both halves of the broker ↔ instance protocol: the
//! broker side (listener, per-connection session state machine, broadcast
//! fan-out) and the instance side (dialer, RPC operations, passive
//! directory replica kept convergent through event messages).

pub mod client;
pub mod emitter;
pub mod error;
pub mod framing;
pub mod protocol;
pub mod replica;
pub mod server;
pub mod session;
pub mod state;

pub use client::Instance;
pub use emitter::{Emitter, EmitterHandle, OUTBOX_CAPACITY};
pub use error::NetError;
pub use protocol::{Message, MessageType};
pub use server::Broker;
pub use state::{BrokerState, SharedState};
