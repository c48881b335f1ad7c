use error_stack::{Report, bail};

use crate::error::SignalError;
use crate::indicator::{Indicator, IndicatorSeries, ensure_len};
use crate::model::SignalState;

pub const DEFAULT_OVERSOLD: f64 = 30.0;
pub const DEFAULT_OVERBOUGHT: f64 = 70.0;

/// RSI (Relative Strength Index) using Wilder's smoothing method.
pub struct Rsi {
    period: usize,
    oversold: f64,
    overbought: f64,
}

impl Rsi {
    pub fn with_thresholds(
        period: usize,
        oversold: f64,
        overbought: f64,
    ) -> Result<Self, Report<SignalError>> {
        if period == 0 {
            bail!(SignalError::InvalidConfiguration {
                reason: "RSI period must be > 0".into(),
            });
        }
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        if !in_range(oversold) || !in_range(overbought) || oversold >= overbought {
            bail!(SignalError::InvalidConfiguration {
                reason: format!(
                    "RSI thresholds must satisfy 0 <= oversold ({oversold}) < overbought ({overbought}) <= 100"
                ),
            });
        }
        Ok(Self {
            period,
            oversold,
            overbought,
        })
    }

    pub fn state_of(&self, rsi: f64) -> SignalState {
        if rsi >= self.overbought {
            SignalState::Sell
        } else if rsi <= self.oversold {
            SignalState::Buy
        } else {
            SignalState::Hold
        }
    }
}

impl Indicator for Rsi {
    type Point = f64;

    fn name(&self) -> &'static str {
        "rsi"
    }

    fn lookback(&self) -> usize {
        self.period + 1
    }

    fn calculate(&self, prices: &[f64]) -> Result<IndicatorSeries<f64>, Report<SignalError>> {
        ensure_len(prices, self.lookback())?;

        let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();

        // Seed using simple average of first `period` gains/losses
        let mut avg_gain: f64 = deltas[..self.period]
            .iter()
            .map(|&d| d.max(0.0))
            .sum::<f64>()
            / self.period as f64;
        let mut avg_loss: f64 = deltas[..self.period]
            .iter()
            .map(|&d| (-d).max(0.0))
            .sum::<f64>()
            / self.period as f64;

        let mut results = Vec::with_capacity(deltas.len() - self.period + 1);
        results.push(rsi_value(avg_gain, avg_loss));

        // Wilder smoothing for subsequent values
        for &delta in &deltas[self.period..] {
            let gain = delta.max(0.0);
            let loss = (-delta).max(0.0);
            avg_gain = (avg_gain * (self.period - 1) as f64 + gain) / self.period as f64;
            avg_loss = (avg_loss * (self.period - 1) as f64 + loss) / self.period as f64;
            results.push(rsi_value(avg_gain, avg_loss));
        }

        Ok(IndicatorSeries::new(self.period, results))
    }

    fn classify(&self, series: &IndicatorSeries<f64>, _prices: &[f64]) -> Vec<SignalState> {
        series.values().iter().map(|&v| self.state_of(v)).collect()
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
