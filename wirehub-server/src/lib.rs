//! # wirehub-server
//!
//! Gateway server for wirehub.
//!
//! This crate provides:
//! - A per-connection channel actor with read/write deadlines
//! - A concurrent identity-to-channel registry
//! - The accept/handshake/readloop lifecycle and push by identity
//! - Collaborator traits for handshake, message delivery, and state events

pub mod channel;
pub mod error;
pub mod listener;
pub mod registry;
pub mod server;

pub use channel::{Channel, ChannelState, DEFAULT_READ_WAIT, DEFAULT_WRITE_WAIT};
pub use error::ServerError;
pub use listener::{Acceptor, Agent, MessageListener, StateListener};
pub use registry::{ChannelMap, DashChannelMap};
pub use server::{Server, ServerConfig, ServerStats, DEFAULT_ACCEPT_WAIT};
