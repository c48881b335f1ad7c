use error_stack::{Report, bail};
use serde::Serialize;

use crate::error::SignalError;
use crate::indicator::ma::Sma;
use crate::indicator::{Indicator, IndicatorSeries, ensure_len};
use crate::model::SignalState;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandPoint {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl BandPoint {
    /// A band with no width (flat window or zero multiplier).
    pub fn is_collapsed(&self) -> bool {
        self.upper <= self.lower
    }
}

/// Bollinger Bands over the population standard deviation of the window.
pub struct BollingerBands {
    period: usize,
    std_dev_multiplier: f64,
}

impl BollingerBands {
    pub fn new(period: usize, std_dev_multiplier: f64) -> Result<Self, Report<SignalError>> {
        if period == 0 {
            bail!(SignalError::InvalidConfiguration {
                reason: "Bollinger period must be > 0".into(),
            });
        }
        if !std_dev_multiplier.is_finite() || std_dev_multiplier < 0.0 {
            bail!(SignalError::InvalidConfiguration {
                reason: format!(
                    "Bollinger std dev multiplier must be finite and >= 0, got {std_dev_multiplier}"
                ),
            });
        }
        Ok(Self {
            period,
            std_dev_multiplier,
        })
    }
}

impl Indicator for BollingerBands {
    type Point = BandPoint;

    fn name(&self) -> &'static str {
        "bollinger"
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn calculate(&self, prices: &[f64]) -> Result<IndicatorSeries<BandPoint>, Report<SignalError>> {
        ensure_len(prices, self.period)?;

        let sma = Sma::new(self.period)?.calculate_prices(prices)?;

        let bands = prices
            .windows(self.period)
            .zip(sma.iter())
            .map(|(window, &middle)| {
                let variance =
                    window.iter().map(|&p| (p - middle).powi(2)).sum::<f64>() / self.period as f64;
                let std_dev = variance.sqrt();
                BandPoint {
                    upper: middle + self.std_dev_multiplier * std_dev,
                    middle,
                    lower: middle - self.std_dev_multiplier * std_dev,
                }
            })
            .collect();

        Ok(IndicatorSeries::new(self.period - 1, bands))
    }

    /// Close at or beyond a band is a mean-reversion signal; collapsed bands hold.
    fn classify(&self, series: &IndicatorSeries<BandPoint>, prices: &[f64]) -> Vec<SignalState> {
        series
            .values()
            .iter()
            .zip(&prices[series.offset()..])
            .map(|(band, &close)| {
                if band.is_collapsed() {
                    SignalState::Hold
                } else if close <= band.lower {
                    SignalState::Buy
                } else if close >= band.upper {
                    SignalState::Sell
                } else {
                    SignalState::Hold
                }
            })
            .collect()
    }
}
