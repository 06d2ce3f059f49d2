use super::data::InlineOrder;
use super::data::UpdateId;
use super::error::BncResult;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct SymbolSnapshot {
    pub last_update_id: UpdateId,
    pub bids: Vec<InlineOrder>,
    pub asks: Vec<InlineOrder>,
}

/// Implementers of this trait are capable of fetching the latest state of some symbol (in other words - a snapshot).
#[async_trait]
pub trait SnapshotFetcher {
    /// Fetch the current depth snapshot of the symbol.
    async fn fetch_snapshot(&self, symbol: &str) -> BncResult<SymbolSnapshot>;
}
