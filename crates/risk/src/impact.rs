//! Impact curve from walking the ask side.

use crate::OrderBook;
use sentinel_types::{ImpactCurve, ImpactPoint};

/// Trade sizes evaluated, USD notional.
pub const IMPACT_TARGETS_USD: [f64; 5] = [10_000.0, 50_000.0, 100_000.0, 500_000.0, 1_000_000.0];

/// Walks sorted asks filling each target notional. Execution price is
/// total cost over total quantity; slippage is `(exec - mid) / mid`.
/// `max_tradeable` is the full ask-side notional. `None` when the book has
/// no mid.
pub fn impact_curve(book: &OrderBook) -> Option<ImpactCurve> {
    let mid = book.mid()?;
    let points = IMPACT_TARGETS_USD
        .iter()
        .map(|target| walk_asks(book, mid, *target))
        .collect();
    let max_tradeable = book.asks.iter().map(|level| level.notional()).sum();
    Some(ImpactCurve { points, max_tradeable })
}

fn walk_asks(book: &OrderBook, mid: f64, target_notional: f64) -> ImpactPoint {
    let mut remaining = target_notional;
    let mut total_cost = 0.0;
    let mut total_quantity = 0.0;
    for level in &book.asks {
        if remaining <= 0.0 {
            break;
        }
        let take = remaining.min(level.notional());
        total_cost += take;
        total_quantity += take / level.price;
        remaining -= take;
    }
    let filled = remaining <= 0.0;
    let execution_price =
        if total_quantity > 0.0 { total_cost / total_quantity } else { mid };
    ImpactPoint {
        notional: target_notional,
        execution_price,
        slippage: (execution_price - mid) / mid,
        filled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BookLevel;

    fn book() -> OrderBook {
        OrderBook {
            bids: vec![BookLevel { price: 99.0, amount: 100.0 }],
            // 100k notional at 101, then 100k at 103.
            asks: vec![
                BookLevel { price: 101.0, amount: 990.099 },
                BookLevel { price: 103.0, amount: 970.873 },
            ],
        }
    }

    #[test]
    fn small_orders_fill_at_the_touch() {
        let curve = impact_curve(&book()).unwrap();
        let point = &curve.points[0];
        assert!(point.filled);
        assert!((point.execution_price - 101.0).abs() < 1e-9);
        assert!(point.slippage > 0.0);
    }

    #[test]
    fn large_orders_walk_deeper_and_slip_more() {
        let curve = impact_curve(&book()).unwrap();
        let fills: Vec<&ImpactPoint> =
            curve.points.iter().filter(|point| point.filled).collect();
        for pair in fills.windows(2) {
            assert!(pair[1].slippage >= pair[0].slippage);
        }
    }

    #[test]
    fn oversized_orders_are_marked_unfilled() {
        let curve = impact_curve(&book()).unwrap();
        // The book holds ~200k notional; the 500k and 1M targets cannot
        // fill.
        assert!(!curve.points[3].filled);
        assert!(!curve.points[4].filled);
        assert!((curve.max_tradeable - 200_000.0).abs() < 1.0);
    }

    #[test]
    fn empty_book_has_no_curve() {
        let book = OrderBook { bids: vec![], asks: vec![] };
        assert!(impact_curve(&book).is_none());
    }
}
