//! # wirehub-client
//!
//! Client library for wirehub gateways.
//!
//! This crate provides:
//! - A pluggable [`Dialer`] for outbound dial plus handshake
//! - A [`Client`] holding one framed connection with send/read/close

pub mod client;
pub mod dialer;
pub mod error;

pub use client::{Client, ClientConfig};
pub use dialer::{Dialer, DialerContext, TcpDialer};
pub use error::ClientError;
