//! Order-book structures parsed from purchased market data.

use serde::{Deserialize, Serialize};

/// One price level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    /// Quoted price.
    pub price: f64,
    /// Quantity at the level, base units.
    pub amount: f64,
}

impl BookLevel {
    /// Notional value of the level.
    pub fn notional(&self) -> f64 {
        self.price * self.amount
    }
}

/// A two-sided order book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    /// Bids, best (highest) first.
    pub bids: Vec<BookLevel>,
    /// Asks, best (lowest) first.
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    /// Parses the gateway's order-book payload.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let mut book: Self = serde_json::from_slice(bytes)?;
        book.normalize();
        Ok(book)
    }

    /// Sorts both sides best-first.
    pub fn normalize(&mut self) {
        self.bids.sort_by(|a, b| b.price.total_cmp(&a.price));
        self.asks.sort_by(|a, b| a.price.total_cmp(&b.price));
    }

    /// Midpoint of the best bid and ask; `None` when either side is empty.
    pub fn mid(&self) -> Option<f64> {
        match (self.bids.first(), self.asks.first()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / 2.0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes() {
        let json = br#"{
            "bids": [{"price": 99.0, "amount": 1.0}, {"price": 100.0, "amount": 2.0}],
            "asks": [{"price": 102.0, "amount": 1.0}, {"price": 101.0, "amount": 2.0}]
        }"#;
        let book = OrderBook::from_json(json).unwrap();
        assert_eq!(book.bids[0].price, 100.0);
        assert_eq!(book.asks[0].price, 101.0);
        assert_eq!(book.mid(), Some(100.5));
    }

    #[test]
    fn empty_side_has_no_mid() {
        let book = OrderBook { bids: vec![], asks: vec![BookLevel { price: 1.0, amount: 1.0 }] };
        assert_eq!(book.mid(), None);
    }
}
