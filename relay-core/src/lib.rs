//! # Relay Core
//!
//! Wire types shared by the Relay message hub and its clients.
//!
//! This crate defines:
//! - The [`Envelope`] exchanged on the wire in both directions
//! - The [`MessageType`] vocabulary used to select dispatch behavior
//! - The [`RelayError`] hierarchy used across the hub
//!
//! The crate is deliberately free of I/O so that the wire contract can be
//! depended on by clients, tools, and tests without pulling in the hub
//! runtime.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod envelope;
pub mod error;
pub mod types;

pub use envelope::Envelope;
pub use error::{RelayError, Result};
pub use types::MessageType;
