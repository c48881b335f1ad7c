use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lookback range and bar interval pair offered to the user.
///
/// String representations match the config file and CLI format (e.g. `"1M"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    Day1,
    Week1,
    Month1,
    Month3,
    Month6,
    Year1,
    Year5,
    Max,
}

impl Timeframe {
    pub const ALL: [Timeframe; 8] = [
        Self::Day1,
        Self::Week1,
        Self::Month1,
        Self::Month3,
        Self::Month6,
        Self::Year1,
        Self::Year5,
        Self::Max,
    ];

    /// Parse a config-format string into a `Timeframe`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1D" => Some(Self::Day1),
            "1W" => Some(Self::Week1),
            "1M" => Some(Self::Month1),
            "3M" => Some(Self::Month3),
            "6M" => Some(Self::Month6),
            "1Y" => Some(Self::Year1),
            "5Y" => Some(Self::Year5),
            "Max" => Some(Self::Max),
            _ => None,
        }
    }

    /// Return the config-format string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day1 => "1D",
            Self::Week1 => "1W",
            Self::Month1 => "1M",
            Self::Month3 => "3M",
            Self::Month6 => "6M",
            Self::Year1 => "1Y",
            Self::Year5 => "5Y",
            Self::Max => "Max",
        }
    }

    /// Yahoo chart `range` parameter.
    pub fn yahoo_range(self) -> &'static str {
        match self {
            Self::Day1 => "1d",
            Self::Week1 => "7d",
            Self::Month1 => "1mo",
            Self::Month3 => "3mo",
            Self::Month6 => "6mo",
            Self::Year1 => "1y",
            Self::Year5 => "5y",
            Self::Max => "max",
        }
    }

    /// Yahoo chart `interval` parameter.
    pub fn yahoo_interval(self) -> &'static str {
        match self {
            Self::Day1 => "1m",
            Self::Week1 => "15m",
            Self::Month1 | Self::Month3 | Self::Month6 | Self::Year1 => "1d",
            Self::Year5 => "1wk",
            Self::Max => "1mo",
        }
    }

    pub fn is_intraday(self) -> bool {
        matches!(self, Self::Day1 | Self::Week1)
    }

    /// Intraday bars use the raw close; daily and longer use the adjusted close.
    pub fn price_field(self) -> PriceField {
        if self.is_intraday() {
            PriceField::Close
        } else {
            PriceField::AdjClose
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceField {
    Close,
    AdjClose,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: Option<f64>,
    pub volume: f64,
}

impl PriceBar {
    pub fn price(&self, field: PriceField) -> f64 {
        match field {
            PriceField::Close => self.close,
            PriceField::AdjClose => self.adj_close.unwrap_or(self.close),
        }
    }
}

/// Discrete state of one indicator at one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalState {
    Buy,
    Hold,
    Sell,
}

impl fmt::Display for SignalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Hold => write!(f, "HOLD"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Majority-vote outcome over the three indicator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Buy,
    Hold,
    Sell,
}

impl Recommendation {
    /// Display ordering used by the overview: buy first, sell last.
    pub fn rank(self) -> u8 {
        match self {
            Self::Buy => 0,
            Self::Hold => 1,
            Self::Sell => 2,
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Hold => write!(f, "HOLD"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Search hit returned by the data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub exchange: String,
}
