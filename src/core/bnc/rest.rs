use super::config::BncCfg;
use super::error::{BncError, BncResult};
use super::snapshot::{SnapshotFetcher, SymbolSnapshot};
use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;

const SNAPSHOT_LIMIT: u32 = 50;

#[derive(Debug, Clone)]
pub struct BncRestClient {
    base_url: String,
    client: Client,
}

impl BncRestClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    pub fn from_cfg(cfg: &BncCfg) -> Self {
        Self::new(Client::new(), cfg.baseurl.clone())
    }

    fn snapshot_url(&self, symbol: &str) -> String {
        format!(
            "{base}/api/v3/depth?symbol={symbol}&limit={limit}",
            base = self.base_url,
            symbol = symbol,
            limit = SNAPSHOT_LIMIT
        )
    }
}

#[async_trait]
impl SnapshotFetcher for BncRestClient {
    /// Fetch current snapshot of the symbol.
    ///
    /// The transport error is checked first, then the HTTP status, and only then is the body
    /// read - a response whose status is non-2xx has no business being decoded as a snapshot,
    /// and earlier variants of this fetch dereferenced the body before either check.
    async fn fetch_snapshot(&self, symbol: &str) -> BncResult<SymbolSnapshot> {
        debug!("Sending REST request to get market depth for {symbol}");

        let response = self.client.get(self.snapshot_url(symbol)).send().await?;

        let status = response.status();
        if !status.is_success() {
            error!("Snapshot request for {symbol} failed with status {status}");
            return Err(BncError::SnapshotHttpError {
                symbol: symbol.to_string(),
                status: status.as_u16(),
            });
        }

        let snapshot: SymbolSnapshot = response.json().await?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_builds_the_depth_snapshot_url() {
        let client = BncRestClient::new(Client::new(), "https://api.binance.com".into());
        assert_eq!(
            client.snapshot_url("BTCUSDT"),
            "https://api.binance.com/api/v3/depth?symbol=BTCUSDT&limit=50"
        );
    }
}
