//! # Busline Server Library
//!
//! Azure Service Bus plumbing for publishing and consuming small domain
//! records over AMQP.
//!
//! ## Modules
//!
//! - [`connection`] - Connection string parsing, transport settings, connection caching and SAS tokens
//! - [`codec`] - JSON message bodies with a `_type` discriminator
//! - [`model`] - The `Employee` and `Email` records
//! - [`destination`] - Queue and topic subscription addressing
//! - [`producer`] - Service Bus sender wrapper
//! - [`publisher`] - Message template and sinks for sending records
//! - [`consumer`] - Service Bus receiver wrapper
//! - [`listener`] - Listener container running registered handlers
//! - [`memory`] - In-process broker for running without a namespace
//! - [`errors`] - Error types shared by all modules
//! - [`utils`] - Utility functions and helpers

pub mod codec;
pub mod connection;
pub mod consumer;
pub mod destination;
pub mod errors;
pub mod listener;
pub mod memory;
pub mod model;
pub mod producer;
pub mod publisher;
pub mod utils;
