use derive_getters::Getters;
use serde::Deserialize;

/// Configuration of the upstream websocket connection: dial target and the reconnect/read-deadline
/// tunables driving the §4.5 connection state machine.
#[derive(Debug, Clone, Deserialize, Getters)]
pub struct WsCfg {
    #[serde(default = "default_baseurl")]
    pub baseurl: String,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_read_deadline_secs")]
    pub read_deadline_secs: u64,
}

impl Default for WsCfg {
    fn default() -> Self {
        Self {
            baseurl: default_baseurl(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            read_deadline_secs: default_read_deadline_secs(),
        }
    }
}

fn default_baseurl() -> String {
    "wss://stream.binance.com:9443/ws".into()
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_read_deadline_secs() -> u64 {
    60
}
