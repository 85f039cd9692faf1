//! # Relay Server
//!
//! Binary crate wiring the relay hub to its process environment:
//! configuration loading, logging initialization, signal handling, and the
//! HTTP listener.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod logging;
pub mod server;

pub use config::{ConfigError, HttpConfig, ServerConfig};
pub use logging::{LogConfig, LogFormat, init_logging};
pub use server::{RelayServer, ServerError};
