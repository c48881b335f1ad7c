use error_stack::{Report, bail};

use crate::error::SignalError;
use crate::indicator::ensure_len;

/// Mean of `window`, taken as offsets from its first value so a constant
/// window returns that value exactly.
fn window_mean(window: &[f64]) -> f64 {
    let Some(&base) = window.first() else {
        return 0.0;
    };
    base + window.iter().map(|&p| p - base).sum::<f64>() / window.len() as f64
}

/// Simple Moving Average.
pub struct Sma {
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self, Report<SignalError>> {
        if period == 0 {
            bail!(SignalError::InvalidConfiguration {
                reason: "SMA period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }

    /// One mean per trailing window; the first value covers `prices[..period]`.
    pub fn calculate_prices(&self, prices: &[f64]) -> Result<Vec<f64>, Report<SignalError>> {
        ensure_len(prices, self.period)?;
        Ok(prices.windows(self.period).map(window_mean).collect())
    }
}

/// Exponential Moving Average with smoothing factor `2 / (period + 1)`.
pub struct Ema {
    period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self, Report<SignalError>> {
        if period == 0 {
            bail!(SignalError::InvalidConfiguration {
                reason: "EMA period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }

    /// EMA values starting at index `period - 1` of `prices`.
    pub fn calculate_prices(&self, prices: &[f64]) -> Result<Vec<f64>, Report<SignalError>> {
        ensure_len(prices, self.period)?;

        let k = 2.0 / (self.period as f64 + 1.0);
        // Seed with SMA of first `period` values
        let mut ema = window_mean(&prices[..self.period]);
        let mut results = Vec::with_capacity(prices.len() - self.period + 1);
        results.push(ema);

        for &price in &prices[self.period..] {
            // Incremental form keeps a constant series exactly constant
            ema += (price - ema) * k;
            results.push(ema);
        }

        Ok(results)
    }
}
