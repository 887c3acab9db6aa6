//! Command-line publisher and subscriber for Azure Service Bus.

pub mod commands;
pub mod config;
pub mod logger;
pub mod messages;
