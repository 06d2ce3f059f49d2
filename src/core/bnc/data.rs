use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Symbol represents some trading pair in the BNC system, normalized to upper-case internally.
pub type Symbol = String;

/// UpdateID is supplied in most of the required binance API parts, so it's better to include it here.
pub type UpdateId = u64;

/// Normalize a wire-provided symbol to the internal upper-case representation.
pub fn normalize_symbol(symbol: &str) -> Symbol {
    symbol.to_ascii_uppercase()
}

/// It's fairly funny that amounts (e.g. in prices) in the states of binance API are presented as Strings.
/// So we provide kind of encapsulation here just to feel a little safer.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Amount(pub String);

impl Amount {
    /// Parse amount into a finite f64. Callers decide what to do with a malformed entry -
    /// see BncError::ParseError, which is what every call site turns a failure into.
    pub fn to_f64(&self) -> Result<f64, std::num::ParseFloatError> {
        self.0.parse()
    }
}

impl From<f64> for Amount {
    fn from(value: f64) -> Self {
        Self(format!("{value}"))
    }
}

/// A price level identity. Wraps f64 so ordered maps keyed by price sort numerically - a plain
/// BTreeMap<String, Qty> would sort lexicographically, which breaks on multi-digit prices.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct Price(pub f64);

impl PartialEq for Price {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for Price {}

impl PartialOrd for Price {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Price {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Binance order representation - holds price and amount.
///
/// Again, due to the strange binance wire format, we are to use tuple syntax here
/// as the exchange sends arrays instead of objects in depth/snapshot payloads.
#[derive(Deserialize, Clone, Debug)]
pub struct InlineOrder(pub Amount, pub Amount);

impl InlineOrder {
    pub fn price(&self) -> &Amount {
        &self.0
    }

    pub fn qty(&self) -> &Amount {
        &self.1
    }
}

/// An incremental depth update, already demultiplexed from the control channel and parsed off the wire.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct EventUpdate {
    #[serde(rename = "e")]
    pub event_type: String,

    #[serde(rename = "s")]
    pub symbol: Symbol,

    #[serde(rename = "U")]
    pub first_update_id: UpdateId,

    #[serde(rename = "u")]
    pub final_update_id: UpdateId,

    #[serde(rename = "b")]
    pub bids: Vec<InlineOrder>,

    #[serde(rename = "a")]
    pub asks: Vec<InlineOrder>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_orders_prices_numerically_not_lexicographically() {
        let mut prices = vec![Price(9.0), Price(10.0), Price(2.0)];
        prices.sort();
        assert_eq!(
            prices.iter().map(|p| p.0).collect::<Vec<_>>(),
            vec![2.0, 9.0, 10.0]
        );
    }

    #[test]
    fn it_normalizes_symbol_case() {
        assert_eq!(normalize_symbol("btcusdt"), "BTCUSDT");
        assert_eq!(normalize_symbol("BtcUsdt"), "BTCUSDT");
    }

    #[test]
    fn it_parses_amount_to_f64() {
        let amount = Amount("1.50000000".into());
        assert_eq!(amount.to_f64().unwrap(), 1.5);
    }
}
