use thiserror::Error;

/// Errors that the BNC sync/fan-out pipeline can return. Mirrors the taxonomy this system is
/// specified against: transport, protocol, snapshot-mismatch, per-field parse, and backpressure.
#[derive(Error, Debug)]
pub enum BncError {
    #[error("Reqwest crate could not proceed with given data. Origin error: {}", .0)]
    RequestError(reqwest::Error),

    #[error("Snapshot request for {symbol} failed with HTTP status {status}")]
    SnapshotHttpError { symbol: String, status: u16 },

    #[error("Serialization framework was unable to process entity. Possibly some binance entity is malformed. Origin serde error: {}", .0)]
    SerdeError(serde_json::Error),

    #[error("Interaction with WS module failed. Origin error: {}", .0)]
    WsError(tokio_tungstenite::tungstenite::Error),

    #[error("Could not send thread's data to the thread's master.")]
    DataTransmitError,

    #[error("Data was rejected by predicate. Possibly some conditions were unmet.")]
    DataRejected,

    #[error("Sequence gap for {symbol}: expected first_update_id <= {expected_next}, got {first_update_id}")]
    SequenceGap {
        symbol: String,
        expected_next: u64,
        first_update_id: u64,
    },

    #[error("Snapshot for {symbol} at lastUpdateId={snapshot_id} does not bracket the first buffered event (first={first_update_id}, final={final_update_id})")]
    SnapshotMismatch {
        symbol: String,
        snapshot_id: u64,
        first_update_id: u64,
        final_update_id: u64,
    },
}

pub type BncResult<T> = Result<T, BncError>;

impl From<reqwest::Error> for BncError {
    fn from(err: reqwest::Error) -> Self {
        Self::RequestError(err)
    }
}

impl From<serde_json::Error> for BncError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerdeError(err)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WsError(err)
    }
}
