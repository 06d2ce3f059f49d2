/// Listen address and per-subscriber queue tunables for the downstream WS endpoint.
pub mod config;

/// Wire shapes sent to downstream subscribers and the `SUB`/`UNSUB` command grammar.
pub mod protocol;

/// Per-symbol subscriber lists, cursors, and the push loop that drains the out-queue.
pub mod subscription;

/// TCP accept loop and per-connection reader/writer tasks.
pub mod server;
