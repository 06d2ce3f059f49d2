use crate::core::bnc::data::{EventUpdate, InlineOrder, Symbol, UpdateId};
use log::warn;
use serde::Serialize;

/// Wire shape for a single fan-out delta frame, decimal amounts resolved to `f64` the same way
/// a full book snapshot is - subscribers never see the exchange's string-encoded decimals.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DepthDeltaPayload {
    pub symbol: Symbol,
    pub first_update_id: UpdateId,
    pub final_update_id: UpdateId,
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

impl From<&EventUpdate> for DepthDeltaPayload {
    fn from(event: &EventUpdate) -> Self {
        Self {
            symbol: event.symbol.clone(),
            first_update_id: event.first_update_id,
            final_update_id: event.final_update_id,
            bids: resolve_levels(&event.bids),
            asks: resolve_levels(&event.asks),
        }
    }
}

fn resolve_levels(levels: &[InlineOrder]) -> Vec<(f64, f64)> {
    levels
        .iter()
        .filter_map(|level| match (level.price().to_f64(), level.qty().to_f64()) {
            (Ok(price), Ok(qty)) => Some((price, qty)),
            _ => {
                warn!("Skipping malformed level while building downstream delta frame.");
                None
            }
        })
        .collect()
}

/// A parsed downstream client command. Anything that doesn't fit `SUB`/`UNSUB` is echoed back
/// verbatim, matching the teacher's "unknown command" handling.
#[derive(Debug, PartialEq, Eq)]
pub enum ClientCommand {
    Subscribe(Symbol),
    Unsubscribe(Symbol),
    Unknown(String),
}

impl ClientCommand {
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("SUB"), Some(symbol)) => Self::Subscribe(symbol.to_ascii_uppercase()),
            (Some("UNSUB"), Some(symbol)) => Self::Unsubscribe(symbol.to_ascii_uppercase()),
            _ => Self::Unknown(raw.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_parses_subscribe_and_unsubscribe_commands() {
        assert_eq!(ClientCommand::parse("SUB btcusdt"), ClientCommand::Subscribe("BTCUSDT".into()));
        assert_eq!(ClientCommand::parse("UNSUB ethusdt"), ClientCommand::Unsubscribe("ETHUSDT".into()));
    }

    #[test]
    fn it_treats_anything_else_as_unknown() {
        assert_eq!(ClientCommand::parse("PING"), ClientCommand::Unknown("PING".into()));
        assert_eq!(ClientCommand::parse(""), ClientCommand::Unknown("".into()));
    }
}
