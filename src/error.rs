use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

/// Failure reported by a market data provider.
#[derive(Debug, Display, Error)]
pub enum SourceError {
    #[display("failed to build HTTP client for {provider}")]
    Client { provider: String },
    #[display("unknown symbol {symbol}")]
    UnknownSymbol { symbol: String },
    #[display("request to {provider} failed")]
    Request { provider: String },
    #[display("failed to parse response from {provider}")]
    ResponseParse { provider: String },
    #[display("no price data returned for {symbol}")]
    EmptyResult { symbol: String },
}

#[derive(Debug, Display, Error)]
pub enum StorageError {
    #[display("database migration failed")]
    Migration,
    #[display("failed to insert data")]
    Insert,
    #[display("failed to query data")]
    Query,
}

#[derive(Debug, Display, Error)]
pub enum SignalError {
    #[display("insufficient data: need {required}, got {available}")]
    InsufficientData { required: usize, available: usize },
    #[display("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },
    #[display("price bars out of order at index {index}")]
    UnorderedBars { index: usize },
}

#[derive(Debug, Display, Error)]
pub enum WatchlistError {
    #[display("failed to read watchlist file")]
    Read,
    #[display("failed to write watchlist file")]
    Write,
    #[display("failed to parse watchlist: {reason}")]
    Parse { reason: String },
}

/// Per-ticker failure while refreshing the overview.
#[derive(Debug, Display, Error)]
pub enum OverviewError {
    #[display("fetch failed for {symbol}")]
    Fetch { symbol: String },
    #[display("analysis failed for {symbol}")]
    Analysis { symbol: String },
    #[display("refresh task for {symbol} did not complete")]
    Task { symbol: String },
}
