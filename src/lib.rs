/// Module that holds core app's functionality - book store, queues, processors, and the
/// upstream (binance) client driving the snapshot/stream reconciliation pipeline.
mod core;

/// Downstream WS fan-out endpoint: subscriber registry, push loop, and the accept loop.
pub mod downstream;

/// General application's configuration;
///
/// This module doesn't include some specific configuration for the subparts of the application,
/// but the summary of these configuration files.
pub mod config;

/// Wires every component together and drives the process to a graceful shutdown.
pub mod run;
