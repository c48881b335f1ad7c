pub mod sqlite;

use chrono::{DateTime, Utc};
use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::StorageError;
use crate::model::{PriceBar, Timeframe};

/// A bar series as last stored, with the time it was fetched.
#[derive(Debug, Clone)]
pub struct CachedBars {
    pub fetched_at: DateTime<Utc>,
    pub bars: Vec<PriceBar>,
}

pub trait BarCache: Send + Sync {
    /// Replace the stored series for `(symbol, timeframe)` and stamp it as
    /// fetched now.
    fn store_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        bars: &[PriceBar],
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>>;

    /// The stored series, oldest first, or `None` if never stored.
    fn cached_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> BoxFuture<'_, Result<Option<CachedBars>, Report<StorageError>>>;
}
