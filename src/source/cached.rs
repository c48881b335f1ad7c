use std::sync::Arc;

use chrono::{Duration, Utc};
use error_stack::Report;
use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::config::DataConfig;
use crate::error::SourceError;
use crate::model::{PriceBar, Quote, Timeframe};
use crate::source::DataSource;
use crate::storage::BarCache;

/// Read-through cache in front of another `DataSource`.
///
/// A stored series younger than its timeframe's TTL is served without a
/// request. Cache failures never fail a fetch; they are logged and skipped.
pub struct CachedSource {
    inner: Arc<dyn DataSource>,
    cache: Arc<dyn BarCache>,
    intraday_ttl: Duration,
    daily_ttl: Duration,
}

impl CachedSource {
    pub fn new(inner: Arc<dyn DataSource>, cache: Arc<dyn BarCache>, config: &DataConfig) -> Self {
        Self {
            inner,
            cache,
            intraday_ttl: config.cache_ttl(Timeframe::Day1),
            daily_ttl: config.cache_ttl(Timeframe::Month1),
        }
    }

    fn ttl(&self, timeframe: Timeframe) -> Duration {
        if timeframe.is_intraday() {
            self.intraday_ttl
        } else {
            self.daily_ttl
        }
    }
}

impl DataSource for CachedSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> BoxFuture<'_, Result<Vec<PriceBar>, Report<SourceError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            match self.cache.cached_bars(&symbol, timeframe).await {
                Ok(Some(cached))
                    if !cached.bars.is_empty()
                        && Utc::now() - cached.fetched_at < self.ttl(timeframe) =>
                {
                    debug!(
                        symbol = %symbol,
                        timeframe = %timeframe,
                        bars = cached.bars.len(),
                        "serving bars from cache"
                    );
                    return Ok(cached.bars);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(symbol = %symbol, error = ?e, "bar cache read failed, fetching");
                }
            }

            let bars = self.inner.fetch_bars(&symbol, timeframe).await?;

            if let Err(e) = self.cache.store_bars(&symbol, timeframe, &bars).await {
                warn!(symbol = %symbol, error = ?e, "bar cache write failed");
            }

            Ok(bars)
        })
    }

    fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Quote>, Report<SourceError>>> {
        self.inner.search(query, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::storage::CachedBars;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
    }

    impl DataSource for CountingSource {
        fn name(&self) -> &str {
            "counting"
        }

        fn fetch_bars(
            &self,
            symbol: &str,
            _timeframe: Timeframe,
        ) -> BoxFuture<'_, Result<Vec<PriceBar>, Report<SourceError>>> {
            let symbol = symbol.to_owned();
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if symbol == "BAD" {
                    return Err(Report::new(SourceError::UnknownSymbol { symbol }));
                }
                Ok(vec![bar(n as f64)])
            })
        }

        fn search(
            &self,
            query: &str,
            _limit: usize,
        ) -> BoxFuture<'_, Result<Vec<Quote>, Report<SourceError>>> {
            let query = query.to_owned();
            Box::pin(async move {
                Ok(vec![Quote {
                    symbol: query,
                    name: String::new(),
                    exchange: String::new(),
                }])
            })
        }
    }

    #[derive(Default)]
    struct MemoryCache {
        entries: Mutex<HashMap<(String, Timeframe), CachedBars>>,
    }

    impl BarCache for MemoryCache {
        fn store_bars(
            &self,
            symbol: &str,
            timeframe: Timeframe,
            bars: &[PriceBar],
        ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
            let key = (symbol.to_owned(), timeframe);
            let entry = CachedBars {
                fetched_at: Utc::now(),
                bars: bars.to_vec(),
            };
            Box::pin(async move {
                self.entries.lock().unwrap().insert(key, entry);
                Ok(())
            })
        }

        fn cached_bars(
            &self,
            symbol: &str,
            timeframe: Timeframe,
        ) -> BoxFuture<'_, Result<Option<CachedBars>, Report<StorageError>>> {
            let key = (symbol.to_owned(), timeframe);
            Box::pin(async move { Ok(self.entries.lock().unwrap().get(&key).cloned()) })
        }
    }

    struct BrokenCache;

    impl BarCache for BrokenCache {
        fn store_bars(
            &self,
            _symbol: &str,
            _timeframe: Timeframe,
            _bars: &[PriceBar],
        ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
            Box::pin(async { Err(Report::new(StorageError::Insert)) })
        }

        fn cached_bars(
            &self,
            _symbol: &str,
            _timeframe: Timeframe,
        ) -> BoxFuture<'_, Result<Option<CachedBars>, Report<StorageError>>> {
            Box::pin(async { Err(Report::new(StorageError::Query)) })
        }
    }

    fn bar(close: f64) -> PriceBar {
        PriceBar {
            date: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            adj_close: None,
            volume: 0.0,
        }
    }

    fn setup(cache: Arc<dyn BarCache>, config: &DataConfig) -> (Arc<CountingSource>, CachedSource) {
        let inner = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedSource::new(inner.clone(), cache, config);
        (inner, cached)
    }

    #[tokio::test]
    async fn fresh_entry_skips_the_provider() {
        let (inner, source) = setup(Arc::new(MemoryCache::default()), &DataConfig::default());

        let first = source.fetch_bars("AAPL", Timeframe::Month6).await.unwrap();
        let second = source.fetch_bars("AAPL", Timeframe::Month6).await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn expired_entry_is_refetched() {
        let config = DataConfig {
            daily_cache_ttl_secs: 0,
            ..DataConfig::default()
        };
        let (inner, source) = setup(Arc::new(MemoryCache::default()), &config);

        source.fetch_bars("AAPL", Timeframe::Month6).await.unwrap();
        let second = source.fetch_bars("AAPL", Timeframe::Month6).await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(second[0].close, 1.0);
    }

    #[tokio::test]
    async fn timeframes_are_cached_independently() {
        let (inner, source) = setup(Arc::new(MemoryCache::default()), &DataConfig::default());

        source.fetch_bars("AAPL", Timeframe::Month6).await.unwrap();
        source.fetch_bars("AAPL", Timeframe::Year1).await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn broken_cache_is_bypassed() {
        let (inner, source) = setup(Arc::new(BrokenCache), &DataConfig::default());

        source.fetch_bars("AAPL", Timeframe::Month6).await.unwrap();
        source.fetch_bars("AAPL", Timeframe::Month6).await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn provider_errors_pass_through_uncached() {
        let cache = Arc::new(MemoryCache::default());
        let (_, source) = setup(cache.clone(), &DataConfig::default());

        let err = source.fetch_bars("BAD", Timeframe::Month6).await.unwrap_err();
        assert!(matches!(
            err.current_context(),
            SourceError::UnknownSymbol { .. }
        ));
        assert!(cache.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_is_delegated() {
        let (_, source) = setup(Arc::new(MemoryCache::default()), &DataConfig::default());
        let quotes = source.search("MSFT", 5).await.unwrap();
        assert_eq!(quotes[0].symbol, "MSFT");
        assert_eq!(source.name(), "counting");
    }
}
