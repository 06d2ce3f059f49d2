pub mod config;

/// Holds implementation of async rest API fetcher using reqwest crate;
/// Implements needed traits described in the fetch module.
pub mod rest;

/// Traits for various(and used) parts of bnc api.
pub mod snapshot;

/// Hold BNC type and entities definitions that are in use in current application.
///
/// Not all the deserializable traits are included here, some are moved to specific submodules, like snapshot module.
pub mod data;

/// Holds error and result definitions for this part of the core.
pub mod error;

/// Per-symbol order book ladders and the sharded store that owns them.
pub mod book;

/// Bounded per-symbol in-queues and the single fan-out out-queue.
pub mod queues;

/// Per-symbol processors: apply events in order, enforce the sequencing contract.
pub mod processor;

/// Holds realtime interactions with BNC API.
pub mod ws;
