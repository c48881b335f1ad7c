use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use error_stack::{Report, ResultExt, bail};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::SourceError;
use crate::model::{PriceBar, Quote, Timeframe};
use crate::source::{DataSource, normalize_bars};

const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const YAHOO_SEARCH_URL: &str = "https://query1.finance.yahoo.com/v1/finance/search";
/// Yahoo rejects requests without a browser-like agent with HTTP 429.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) signal-watch/0.1";
const REQUEST_TIMEOUT_SECS: u64 = 10;
/// The public endpoints are unmetered but throttle bursts; stay well below.
pub const DEFAULT_REQUESTS_PER_SECOND: NonZeroU32 = nonzero!(4u32);
const PROVIDER: &str = "yahoo";

pub struct YahooSource {
    client: reqwest::Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl YahooSource {
    pub fn new(requests_per_second: NonZeroU32) -> Result<Self, Report<SourceError>> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .change_context(SourceError::Client {
                provider: PROVIDER.into(),
            })?;
        Ok(Self {
            client,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(requests_per_second))),
        })
    }
}

impl DataSource for YahooSource {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> BoxFuture<'_, Result<Vec<PriceBar>, Report<SourceError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            // Wait for rate limiter before making the request
            self.rate_limiter.until_ready().await;

            let url = chart_url(&symbol)?;
            let params = [
                ("range", timeframe.yahoo_range()),
                ("interval", timeframe.yahoo_interval()),
                ("includeAdjustedClose", "true"),
            ];

            let response = self
                .client
                .get(url)
                .query(&params)
                .send()
                .await
                .change_context(SourceError::Request {
                    provider: PROVIDER.into(),
                })
                .attach_with(|| format!("symbol: {symbol}"))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                bail!(SourceError::UnknownSymbol { symbol });
            }
            if !status.is_success() {
                return Err(Report::new(SourceError::Request {
                    provider: PROVIDER.into(),
                })
                .attach(format!("HTTP status: {status}")));
            }

            let body = response
                .text()
                .await
                .change_context(SourceError::ResponseParse {
                    provider: PROVIDER.into(),
                })?;

            let bars = parse_chart(&body, &symbol, timeframe)?;

            info!(
                symbol = %symbol,
                timeframe = %timeframe,
                fetched = bars.len(),
                "yahoo bar fetch complete"
            );

            Ok(bars)
        })
    }

    fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Quote>, Report<SourceError>>> {
        let query = query.trim().to_owned();
        Box::pin(async move {
            if query.is_empty() {
                return Ok(Vec::new());
            }

            self.rate_limiter.until_ready().await;

            let limit_str = limit.to_string();
            let params = [
                ("q", query.as_str()),
                ("quotesCount", limit_str.as_str()),
                ("newsCount", "0"),
            ];

            let response = self
                .client
                .get(YAHOO_SEARCH_URL)
                .query(&params)
                .send()
                .await
                .change_context(SourceError::Request {
                    provider: PROVIDER.into(),
                })?;

            if !response.status().is_success() {
                return Err(Report::new(SourceError::Request {
                    provider: PROVIDER.into(),
                })
                .attach(format!("HTTP status: {}", response.status())));
            }

            let envelope: SearchEnvelope =
                response
                    .json()
                    .await
                    .change_context(SourceError::ResponseParse {
                        provider: PROVIDER.into(),
                    })?;

            let quotes = envelope.into_quotes(limit);
            debug!(query = %query, matches = quotes.len(), "yahoo search complete");
            Ok(quotes)
        })
    }
}

/// Decode a chart response body into normalized bars.
///
/// Rows with any missing OHLC value are skipped. For intraday timeframes the
/// last bar is still forming and is dropped when there is more than one.
fn parse_chart(
    body: &str,
    symbol: &str,
    timeframe: Timeframe,
) -> Result<Vec<PriceBar>, Report<SourceError>> {
    let envelope: ChartEnvelope =
        serde_json::from_str(body).change_context(SourceError::ResponseParse {
            provider: PROVIDER.into(),
        })?;

    if let Some(error) = envelope.chart.error {
        let description = error.description.unwrap_or_default();
        if error.code == "Not Found" {
            return Err(Report::new(SourceError::UnknownSymbol {
                symbol: symbol.to_owned(),
            })
            .attach(description));
        }
        return Err(Report::new(SourceError::Request {
            provider: PROVIDER.into(),
        })
        .attach(format!("{}: {description}", error.code)));
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        bail!(SourceError::EmptyResult {
            symbol: symbol.to_owned(),
        });
    };

    let mut bars = normalize_bars(result.into_bars(timeframe));
    if timeframe.is_intraday() && bars.len() > 1 {
        bars.pop();
    }

    if bars.is_empty() {
        bail!(SourceError::EmptyResult {
            symbol: symbol.to_owned(),
        });
    }
    Ok(bars)
}

// ── Chart response types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    /// Bar open times (seconds since epoch)
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<QuoteColumns>,
    #[serde(default)]
    adjclose: Vec<AdjCloseColumn>,
}

/// Column-oriented OHLCV; `null` marks a missing bar.
#[derive(Debug, Default, Deserialize)]
struct QuoteColumns {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseColumn {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

impl ChartResult {
    fn into_bars(self, timeframe: Timeframe) -> Vec<PriceBar> {
        let quote = self.indicators.quote.into_iter().next().unwrap_or_default();
        let adjclose = if timeframe.is_intraday() {
            Vec::new()
        } else {
            self.indicators
                .adjclose
                .into_iter()
                .next()
                .map(|c| c.adjclose)
                .unwrap_or_default()
        };
        let at = |column: &[Option<f64>], i: usize| column.get(i).copied().flatten();

        self.timestamp
            .iter()
            .enumerate()
            .filter_map(|(i, &ts)| {
                Some(PriceBar {
                    date: DateTime::from_timestamp(ts, 0)?,
                    open: at(&quote.open, i)?,
                    high: at(&quote.high, i)?,
                    low: at(&quote.low, i)?,
                    close: at(&quote.close, i)?,
                    adj_close: at(&adjclose, i),
                    volume: at(&quote.volume, i).unwrap_or(0.0),
                })
            })
            .collect()
    }
}

// ── Search response types ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    quotes: Vec<SearchQuote>,
}

#[derive(Debug, Deserialize)]
struct SearchQuote {
    symbol: Option<String>,
    shortname: Option<String>,
    longname: Option<String>,
    #[serde(rename = "exchDisp")]
    exch_disp: Option<String>,
    exchange: Option<String>,
}

impl SearchEnvelope {
    /// Keep ASCII symbols only; exotic tickers are not fetchable by symbol.
    fn into_quotes(self, limit: usize) -> Vec<Quote> {
        self.quotes
            .into_iter()
            .filter_map(|q| {
                let symbol = q.symbol.filter(|s| !s.is_empty() && s.is_ascii())?;
                Some(Quote {
                    symbol,
                    name: q.shortname.or(q.longname).unwrap_or_default(),
                    exchange: q.exch_disp.or(q.exchange).unwrap_or_default(),
                })
            })
            .take(limit)
            .collect()
    }
}

/// Chart endpoint for `symbol`, escaped as a single path segment.
fn chart_url(symbol: &str) -> Result<Url, Report<SourceError>> {
    let request_error = || SourceError::Request {
        provider: PROVIDER.into(),
    };
    let mut url = Url::parse(YAHOO_CHART_URL).change_context(request_error())?;
    url.path_segments_mut()
        .map_err(|()| Report::new(request_error()))?
        .push(symbol);
    Ok(url)
}
