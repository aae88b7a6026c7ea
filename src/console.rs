//! Console presentation for a periodic `OrderBookStats` snapshot.

use std::io::{self, Write};

use crate::order_book::OrderBookStats;

/// Render `stats` to `writer`: local datetime, 8-digit float precision,
/// `not yet available` for anything NaN.
pub fn print_stats<W: Write>(stats: &OrderBookStats, writer: &mut W) -> io::Result<()> {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");

    writeln!(writer, "[{now}]")?;
    writeln!(writer, "  highest bid: {}", fmt(stats.current_highest_bid.price_level))?;
    writeln!(writer, "  lowest ask:  {}", fmt(stats.current_lowest_ask.price_level))?;
    writeln!(writer, "  max spread:  {}", fmt(stats.max_ask_bid_diff.diff()))?;
    for (window, value) in &stats.mid_prices {
        writeln!(writer, "  mid price [{window}s]: {}", fmt(*value))?;
    }
    writeln!(writer, "  forecasted mid price: {}", fmt(stats.forecasted_mid_price))?;
    for (window, value) in &stats.forecast_errors {
        writeln!(writer, "  forecast error [{window}s]: {}", fmt(*value))?;
    }
    writer.flush()
}

fn fmt(value: f64) -> String {
    if value.is_nan() {
        "not yet available".to_string()
    } else {
        format!("{value:.8}")
    }
}
