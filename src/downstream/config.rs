use derive_getters::Getters;
use serde::Deserialize;

/// Configuration for the downstream WS fan-out endpoint.
#[derive(Debug, Clone, Getters, Deserialize)]
pub struct DownstreamCfg {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Capacity of each subscriber's outbound queue. Once full, the push loop drops rather
    /// than blocks - a single slow client must never stall delivery to every other subscriber.
    #[serde(default = "default_subscriber_queue_capacity")]
    pub subscriber_queue_capacity: usize,
}

impl Default for DownstreamCfg {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            subscriber_queue_capacity: default_subscriber_queue_capacity(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".into()
}

fn default_subscriber_queue_capacity() -> usize {
    256
}
