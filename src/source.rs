pub mod cached;
pub mod yahoo;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::SourceError;
use crate::model::{PriceBar, Quote, Timeframe};

/// Abstraction over a market data provider.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn DataSource`).
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the bar series covering `timeframe`, oldest first.
    ///
    /// An unknown symbol or an empty response is an error, never an empty
    /// series.
    fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> BoxFuture<'_, Result<Vec<PriceBar>, Report<SourceError>>>;

    /// Look up tickers matching a partial symbol or company name.
    fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Quote>, Report<SourceError>>>;
}

/// Sort bars by date and drop repeated dates, keeping the first occurrence.
pub fn normalize_bars(mut bars: Vec<PriceBar>) -> Vec<PriceBar> {
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    bars
}
