use crate::core::bnc::ws::config::WsCfg;
use derive_getters::Getters;
use serde::Deserialize;

/// Configuration of the whole binance sync/fan-out subsystem: the REST base url used for
/// snapshot fetches, the watch-list, and the bounded-queue capacities from the data model.
#[derive(Debug, Clone, Getters, Deserialize)]
pub struct BncCfg {
    #[serde(default = "default_rest_baseurl")]
    pub baseurl: String,

    #[serde(default)]
    pub ws: WsCfg,

    /// Symbols to watch from process start. Elevates the teacher's compiled-in single symbol
    /// (and the spec's hardcoded {BTCUSDT, ETHUSDT}) to configuration.
    #[serde(default = "default_watch_list")]
    pub watch_list: Vec<String>,

    #[serde(default = "default_in_queue_capacity")]
    pub in_queue_capacity: usize,

    #[serde(default = "default_out_queue_capacity")]
    pub out_queue_capacity: usize,
}

impl Default for BncCfg {
    fn default() -> Self {
        Self {
            baseurl: default_rest_baseurl(),
            ws: WsCfg::default(),
            watch_list: default_watch_list(),
            in_queue_capacity: default_in_queue_capacity(),
            out_queue_capacity: default_out_queue_capacity(),
        }
    }
}

fn default_rest_baseurl() -> String {
    "https://api.binance.com".into()
}

fn default_watch_list() -> Vec<String> {
    vec!["BTCUSDT".into(), "ETHUSDT".into()]
}

fn default_in_queue_capacity() -> usize {
    10_000
}

fn default_out_queue_capacity() -> usize {
    40_000
}
