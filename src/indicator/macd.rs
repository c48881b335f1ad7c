use error_stack::{Report, bail};
use serde::Serialize;

use crate::error::SignalError;
use crate::indicator::ma::Ema;
use crate::indicator::{Indicator, IndicatorSeries, ensure_len};
use crate::model::SignalState;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MacdPoint {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

impl Macd {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        signal_period: usize,
    ) -> Result<Self, Report<SignalError>> {
        if fast_period == 0 || slow_period == 0 || signal_period == 0 {
            bail!(SignalError::InvalidConfiguration {
                reason: "MACD periods must be > 0".into(),
            });
        }
        if fast_period >= slow_period {
            bail!(SignalError::InvalidConfiguration {
                reason: format!(
                    "MACD fast period ({fast_period}) must be < slow period ({slow_period})"
                ),
            });
        }
        Ok(Self {
            fast_period,
            slow_period,
            signal_period,
        })
    }
}

impl Indicator for Macd {
    type Point = MacdPoint;

    fn name(&self) -> &'static str {
        "macd"
    }

    fn lookback(&self) -> usize {
        self.slow_period + self.signal_period - 1
    }

    /// One bar more than the lookback so the latest point has a predecessor.
    fn required_prices(&self) -> usize {
        self.slow_period + self.signal_period
    }

    fn calculate(&self, prices: &[f64]) -> Result<IndicatorSeries<MacdPoint>, Report<SignalError>> {
        ensure_len(prices, self.required_prices())?;

        let fast_ema = Ema::new(self.fast_period)?.calculate_prices(prices)?;
        let slow_ema = Ema::new(self.slow_period)?.calculate_prices(prices)?;

        // Align: slow_ema is shorter by (slow_period - fast_period) elements
        let offset = self.slow_period - self.fast_period;
        let macd_line: Vec<f64> = fast_ema[offset..]
            .iter()
            .zip(slow_ema.iter())
            .map(|(f, s)| f - s)
            .collect();

        let signal_line = Ema::new(self.signal_period)?.calculate_prices(&macd_line)?;
        // Signal is shorter by (signal_period - 1)
        let signal_offset = self.signal_period - 1;
        let points = macd_line[signal_offset..]
            .iter()
            .zip(signal_line.iter())
            .map(|(&line, &signal)| MacdPoint {
                line,
                signal,
                histogram: line - signal,
            })
            .collect();

        Ok(IndicatorSeries::new(self.lookback() - 1, points))
    }

    /// Signal-line crossovers are the only BUY/SELL events; every other bar is HOLD.
    fn classify(&self, series: &IndicatorSeries<MacdPoint>, _prices: &[f64]) -> Vec<SignalState> {
        let values = series.values();
        let mut states = Vec::with_capacity(values.len());
        if !values.is_empty() {
            states.push(SignalState::Hold);
        }
        states.extend(values.windows(2).map(|w| crossover_state(&w[0], &w[1])));
        states
    }
}

fn crossover_state(prev: &MacdPoint, curr: &MacdPoint) -> SignalState {
    if prev.line <= prev.signal && curr.line > curr.signal {
        SignalState::Buy
    } else if prev.line >= prev.signal && curr.line < curr.signal {
        SignalState::Sell
    } else {
        SignalState::Hold
    }
}
