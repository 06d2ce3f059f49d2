/// Upstream WS connection tunables: base URL, backoff bounds, read deadline.
pub mod config;

/// Control-channel wire DTOs (subscribe/unsubscribe/list-subscriptions) and the request-id generator.
pub mod protocol;

/// The reconnecting upstream client: dial, subscribe-then-snapshot, demux, backoff.
pub mod client;
