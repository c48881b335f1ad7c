pub mod bollinger;
pub mod ma;
pub mod macd;
pub mod rsi;

use error_stack::Report;
use serde::Serialize;

use crate::error::SignalError;
use crate::model::{PriceBar, PriceField, SignalState};

/// A technical analysis indicator over a price series.
///
/// Prices must be in ascending chronological order (oldest first).
pub trait Indicator: Send + Sync {
    /// Value produced for one bar.
    type Point: Copy;

    /// Unique name of this indicator (e.g., "rsi", "macd").
    fn name(&self) -> &'static str;

    /// Number of leading bars consumed before the first value is defined,
    /// counting the bar that carries it.
    fn lookback(&self) -> usize;

    /// Minimum number of prices accepted by [`Indicator::calculate`].
    fn required_prices(&self) -> usize {
        self.lookback()
    }

    /// Calculate the indicator series.
    ///
    /// The series holds `prices.len() - lookback + 1` values aligned with the
    /// tail of `prices`.
    fn calculate(&self, prices: &[f64]) -> Result<IndicatorSeries<Self::Point>, Report<SignalError>>;

    /// Derive one state per value of `series`. `prices` is the full input the
    /// series was computed from.
    fn classify(&self, series: &IndicatorSeries<Self::Point>, prices: &[f64]) -> Vec<SignalState>;
}

/// Indicator values aligned with a suffix of the input bars.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSeries<T> {
    offset: usize,
    values: Vec<T>,
}

impl<T: Copy> IndicatorSeries<T> {
    /// `offset` is the index of the bar aligned with `values[0]`.
    pub fn new(offset: usize, values: Vec<T>) -> Self {
        Self { offset, values }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn latest(&self) -> Option<T> {
        self.values.last().copied()
    }

    /// Expand to one slot per bar, `None` during the warm-up bars.
    pub fn aligned(&self, total_len: usize) -> Vec<Option<T>> {
        let mut output = vec![None; total_len];
        for (index, value) in self.values.iter().enumerate() {
            if let Some(slot) = output.get_mut(self.offset + index) {
                *slot = Some(*value);
            }
        }
        output
    }
}

/// Extract the selected price from each bar.
pub fn prices(bars: &[PriceBar], field: PriceField) -> Vec<f64> {
    bars.iter().map(|b| b.price(field)).collect()
}

/// Reject an input shorter than `required`.
pub(crate) fn ensure_len(prices: &[f64], required: usize) -> Result<(), Report<SignalError>> {
    if prices.len() < required {
        return Err(Report::new(SignalError::InsufficientData {
            required,
            available: prices.len(),
        }));
    }
    Ok(())
}
