//! Depth bands around mid price.

use crate::OrderBook;
use sentinel_types::DepthBand;

/// Band widths, percent from mid.
pub const DEPTH_BAND_TARGETS: [f64; 6] = [0.1, 0.25, 0.5, 1.0, 2.0, 5.0];

/// Aggregate notional inside each band: bids with
/// `price >= mid * (1 - p/100)` and asks with `price <= mid * (1 + p/100)`.
/// `None` when the book has no mid.
pub fn depth_bands(book: &OrderBook) -> Option<Vec<DepthBand>> {
    let mid = book.mid()?;
    Some(
        DEPTH_BAND_TARGETS
            .iter()
            .map(|pct| {
                let bid_floor = mid * (1.0 - pct / 100.0);
                let ask_ceiling = mid * (1.0 + pct / 100.0);
                DepthBand {
                    pct_from_mid: *pct,
                    bid_notional: book
                        .bids
                        .iter()
                        .filter(|level| level.price >= bid_floor)
                        .map(|level| level.notional())
                        .sum(),
                    ask_notional: book
                        .asks
                        .iter()
                        .filter(|level| level.price <= ask_ceiling)
                        .map(|level| level.notional())
                        .sum(),
                }
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BookLevel;

    fn book() -> OrderBook {
        OrderBook {
            bids: vec![
                BookLevel { price: 99.9, amount: 10.0 },
                BookLevel { price: 99.0, amount: 10.0 },
                BookLevel { price: 95.0, amount: 10.0 },
            ],
            asks: vec![
                BookLevel { price: 100.1, amount: 10.0 },
                BookLevel { price: 101.0, amount: 10.0 },
                BookLevel { price: 105.0, amount: 10.0 },
            ],
        }
    }

    #[test]
    fn six_bands_widen_monotonically() {
        let bands = depth_bands(&book()).unwrap();
        assert_eq!(bands.len(), 6);
        for pair in bands.windows(2) {
            assert!(pair[1].bid_notional >= pair[0].bid_notional);
            assert!(pair[1].ask_notional >= pair[0].ask_notional);
        }
    }

    #[test]
    fn tight_band_only_counts_touching_levels() {
        // Mid is 100; the 0.1% band spans [99.9, 100.1].
        let bands = depth_bands(&book()).unwrap();
        assert_eq!(bands[0].bid_notional, 999.0);
        assert_eq!(bands[0].ask_notional, 1001.0);
    }

    #[test]
    fn five_percent_band_takes_the_whole_book() {
        let bands = depth_bands(&book()).unwrap();
        assert_eq!(bands[5].bid_notional, 999.0 + 990.0 + 950.0);
        assert_eq!(bands[5].ask_notional, 1001.0 + 1010.0 + 1050.0);
    }

    #[test]
    fn empty_book_has_no_bands() {
        let book = OrderBook { bids: vec![], asks: vec![] };
        assert_eq!(depth_bands(&book), None);
    }
}
