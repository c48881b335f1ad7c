use error_stack::{Report, ResultExt, bail};
use serde::Deserialize;

use crate::error::SignalError;
use crate::indicator::bollinger::{BandPoint, BollingerBands};
use crate::indicator::macd::{Macd, MacdPoint};
use crate::indicator::rsi::{DEFAULT_OVERBOUGHT, DEFAULT_OVERSOLD, Rsi};
use crate::indicator::{Indicator, IndicatorSeries, prices};
use crate::model::{PriceBar, PriceField, Recommendation, SignalState};

/// Indicator periods and thresholds, read from the `[indicators]` config table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IndicatorSettings {
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub bollinger_period: usize,
    pub bollinger_stddev: f64,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            rsi_period: 14,
            rsi_overbought: DEFAULT_OVERBOUGHT,
            rsi_oversold: DEFAULT_OVERSOLD,
            bollinger_period: 20,
            bollinger_stddev: 2.0,
        }
    }
}

pub struct IndicatorSet {
    pub macd: Macd,
    pub rsi: Rsi,
    pub bollinger: BollingerBands,
}

impl IndicatorSettings {
    /// Build the three indicators, failing on any invalid parameter.
    pub fn build(&self) -> Result<IndicatorSet, Report<SignalError>> {
        Ok(IndicatorSet {
            macd: Macd::new(self.macd_fast, self.macd_slow, self.macd_signal)?,
            rsi: Rsi::with_thresholds(self.rsi_period, self.rsi_oversold, self.rsi_overbought)?,
            bollinger: BollingerBands::new(self.bollinger_period, self.bollinger_stddev)?,
        })
    }
}

/// Lean of the MACD histogram at the latest bar. Display only, never voted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl Bias {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
            Self::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorReport<T> {
    pub series: IndicatorSeries<T>,
    /// One state per series value.
    pub states: Vec<SignalState>,
    pub latest: SignalState,
    /// Bars before the latest one that carry the same state.
    pub age: usize,
}

impl<T: Copy> IndicatorReport<T> {
    pub fn latest_value(&self) -> Option<T> {
        self.series.latest()
    }

    /// Bar indices where the state turns into BUY or SELL.
    pub fn flips(&self) -> Vec<(usize, SignalState)> {
        let offset = self.series.offset();
        self.states
            .windows(2)
            .enumerate()
            .filter(|(_, w)| w[0] != w[1] && w[1] != SignalState::Hold)
            .map(|(i, w)| (offset + i + 1, w[1]))
            .collect()
    }

    /// One slot per bar, `None` during the warm-up bars.
    pub fn aligned_states(&self, total_len: usize) -> Vec<Option<SignalState>> {
        let mut output = vec![None; total_len];
        let offset = self.series.offset();
        for (index, state) in self.states.iter().enumerate() {
            if let Some(slot) = output.get_mut(offset + index) {
                *slot = Some(*state);
            }
        }
        output
    }
}

pub type Outcome<T> = Result<IndicatorReport<T>, Report<SignalError>>;

/// Everything derived from one bar series.
#[derive(Debug)]
pub struct Analysis {
    pub bar_count: usize,
    pub macd: Outcome<MacdPoint>,
    pub rsi: Outcome<f64>,
    pub bollinger: Outcome<BandPoint>,
    pub recommendation: Option<Recommendation>,
}

impl Analysis {
    pub fn macd_bias(&self) -> Option<Bias> {
        let point = self.macd.as_ref().ok()?.latest_value()?;
        Some(if point.histogram > 0.0 {
            Bias::Bullish
        } else if point.histogram < 0.0 {
            Bias::Bearish
        } else {
            Bias::Neutral
        })
    }

    pub fn states(&self) -> [Option<SignalState>; 3] {
        [
            self.macd.as_ref().ok().map(|r| r.latest),
            self.rsi.as_ref().ok().map(|r| r.latest),
            self.bollinger.as_ref().ok().map(|r| r.latest),
        ]
    }
}

/// Compute all three indicators and the recommendation for `bars`.
///
/// Fails as a whole only on invalid settings or unordered bars. An indicator
/// without enough history is reported in its own slot.
pub fn analyze(
    bars: &[PriceBar],
    field: PriceField,
    settings: &IndicatorSettings,
) -> Result<Analysis, Report<SignalError>> {
    let set = settings.build()?;
    check_ordered(bars)?;

    let prices = prices(bars, field);
    let macd = evaluate(&set.macd, &prices);
    let rsi = evaluate(&set.rsi, &prices);
    let bollinger = evaluate(&set.bollinger, &prices);

    let mut analysis = Analysis {
        bar_count: bars.len(),
        macd,
        rsi,
        bollinger,
        recommendation: None,
    };
    let [m, r, b] = analysis.states();
    analysis.recommendation = vote(m, r, b);
    Ok(analysis)
}

/// Run one indicator and classify every point of its series.
pub fn evaluate<I: Indicator>(indicator: &I, prices: &[f64]) -> Outcome<I::Point> {
    let series = indicator
        .calculate(prices)
        .attach_with(|| format!("indicator: {}", indicator.name()))?;
    let states = indicator.classify(&series, prices);
    let Some(&latest) = states.last() else {
        bail!(SignalError::InsufficientData {
            required: indicator.required_prices(),
            available: prices.len(),
        });
    };
    let age = signal_age(&states);
    Ok(IndicatorReport {
        series,
        states,
        latest,
        age,
    })
}

/// Bars must be strictly increasing by date.
pub fn check_ordered(bars: &[PriceBar]) -> Result<(), Report<SignalError>> {
    for (index, pair) in bars.windows(2).enumerate() {
        if pair[1].date <= pair[0].date {
            bail!(SignalError::UnorderedBars { index: index + 1 });
        }
    }
    Ok(())
}

/// Number of consecutive states before the last one equal to it.
pub fn signal_age(states: &[SignalState]) -> usize {
    let Some((current, earlier)) = states.split_last() else {
        return 0;
    };
    earlier.iter().rev().take_while(|s| *s == current).count()
}

/// Majority vote over three indicator states.
pub fn aggregate(macd: SignalState, rsi: SignalState, bollinger: SignalState) -> Recommendation {
    tally(&[macd, rsi, bollinger])
}

/// Majority vote where unavailable indicators abstain.
///
/// Returns `None` when fewer than two indicators are available.
pub fn vote(
    macd: Option<SignalState>,
    rsi: Option<SignalState>,
    bollinger: Option<SignalState>,
) -> Option<Recommendation> {
    match (macd, rsi, bollinger) {
        (Some(m), Some(r), Some(b)) => Some(aggregate(m, r, b)),
        (Some(a), Some(b), None) | (Some(a), None, Some(b)) | (None, Some(a), Some(b)) => {
            Some(tally(&[a, b]))
        }
        _ => None,
    }
}

/// Two agreeing states win; anything else holds.
fn tally(states: &[SignalState]) -> Recommendation {
    let buys = states.iter().filter(|s| **s == SignalState::Buy).count();
    let sells = states.iter().filter(|s| **s == SignalState::Sell).count();
    if buys >= 2 {
        Recommendation::Buy
    } else if sells >= 2 {
        Recommendation::Sell
    } else {
        Recommendation::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use quickcheck_macros::quickcheck;

    const ALL_STATES: [SignalState; 3] = [SignalState::Buy, SignalState::Hold, SignalState::Sell];

    fn bars_from_closes(closes: &[f64]) -> Vec<PriceBar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar {
                date: start + Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                adj_close: None,
                volume: 1_000.0,
            })
            .collect()
    }

    fn is_insufficient<T>(outcome: &Outcome<T>) -> bool {
        matches!(
            outcome.as_ref().map(|_| ()).map_err(|e| e.current_context()),
            Err(SignalError::InsufficientData { .. })
        )
    }

    #[test]
    fn aggregate_is_total_and_commutative() {
        for a in ALL_STATES {
            for b in ALL_STATES {
                for c in ALL_STATES {
                    let expected = aggregate(a, b, c);
                    for perm in [(a, c, b), (b, a, c), (b, c, a), (c, a, b), (c, b, a)] {
                        assert_eq!(aggregate(perm.0, perm.1, perm.2), expected);
                    }
                }
            }
        }
    }

    #[test]
    fn aggregate_majority_rules() {
        use SignalState::*;
        assert_eq!(aggregate(Buy, Buy, Sell), Recommendation::Buy);
        assert_eq!(aggregate(Sell, Hold, Sell), Recommendation::Sell);
        assert_eq!(aggregate(Buy, Sell, Hold), Recommendation::Hold);
        assert_eq!(aggregate(Hold, Hold, Hold), Recommendation::Hold);
        assert_eq!(aggregate(Buy, Hold, Hold), Recommendation::Hold);
    }

    #[test]
    fn vote_needs_two_available_states() {
        use SignalState::*;
        assert_eq!(vote(None, None, None), None);
        assert_eq!(vote(None, Some(Sell), None), None);
        assert_eq!(vote(None, Some(Sell), Some(Sell)), Some(Recommendation::Sell));
        assert_eq!(vote(None, Some(Sell), Some(Buy)), Some(Recommendation::Hold));
        assert_eq!(
            vote(Some(Buy), Some(Buy), Some(Sell)),
            Some(Recommendation::Buy)
        );
    }

    #[test]
    fn vote_with_two_states_needs_agreement() {
        use SignalState::*;
        for (a, b) in [(Buy, Buy), (Sell, Sell), (Buy, Hold), (Hold, Sell)] {
            let expected = if a == b {
                aggregate(a, b, Hold)
            } else {
                Recommendation::Hold
            };
            assert_eq!(vote(Some(a), Some(b), None), Some(expected));
            assert_eq!(vote(Some(a), None, Some(b)), Some(expected));
            assert_eq!(vote(None, Some(a), Some(b)), Some(expected));
        }
    }

    #[quickcheck]
    fn vote_with_all_states_matches_aggregate(a: u8, b: u8, c: u8) -> bool {
        let pick = |n: u8| ALL_STATES[(n % 3) as usize];
        vote(Some(pick(a)), Some(pick(b)), Some(pick(c))) == Some(aggregate(pick(a), pick(b), pick(c)))
    }

    #[test]
    fn signal_age_counts_unchanged_predecessors() {
        use SignalState::*;
        assert_eq!(signal_age(&[]), 0);
        assert_eq!(signal_age(&[Buy]), 0);
        assert_eq!(signal_age(&[Sell, Hold, Hold, Hold]), 2);
        assert_eq!(signal_age(&[Hold, Hold, Buy]), 0);
    }

    #[test]
    fn flips_report_bar_indices() {
        use SignalState::*;
        let report = IndicatorReport {
            series: IndicatorSeries::new(5, vec![50.0, 20.0, 25.0, 80.0]),
            states: vec![Hold, Buy, Buy, Sell],
            latest: Sell,
            age: 0,
        };
        assert_eq!(report.flips(), vec![(6, Buy), (8, Sell)]);
        assert_eq!(
            report.aligned_states(10),
            vec![None, None, None, None, None, Some(Hold), Some(Buy), Some(Buy), Some(Sell), None]
        );
    }

    #[test]
    fn constant_prices_recommend_hold() {
        let bars = bars_from_closes(&[123.45; 30]);
        let analysis = analyze(&bars, PriceField::Close, &IndicatorSettings::default()).unwrap();

        assert!(is_insufficient(&analysis.macd));

        let rsi = analysis.rsi.as_ref().unwrap();
        assert_eq!(rsi.latest_value(), Some(100.0));
        assert_eq!(rsi.latest, SignalState::Sell);

        let bb = analysis.bollinger.as_ref().unwrap();
        let band = bb.latest_value().unwrap();
        assert_eq!(band.upper, band.middle);
        assert_eq!(band.middle, band.lower);
        assert_eq!(bb.latest, SignalState::Hold);

        assert_eq!(analysis.recommendation, Some(Recommendation::Hold));
    }

    #[test]
    fn constant_prices_macd_histogram_is_zero() {
        let bars = bars_from_closes(&[42.0; 30]);
        let settings = IndicatorSettings {
            macd_fast: 3,
            macd_slow: 7,
            macd_signal: 3,
            ..IndicatorSettings::default()
        };
        let analysis = analyze(&bars, PriceField::Close, &settings).unwrap();
        let macd = analysis.macd.as_ref().unwrap();
        assert!(macd.series.values().iter().all(|p| p.histogram == 0.0));
        assert_eq!(macd.latest, SignalState::Hold);
        assert_eq!(analysis.recommendation, Some(Recommendation::Hold));
    }

    #[test]
    fn accelerating_rally_recommends_sell() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 * 1.15_f64.powi(i)).collect();
        let bars = bars_from_closes(&closes);
        let analysis = analyze(&bars, PriceField::Close, &IndicatorSettings::default()).unwrap();

        assert!(is_insufficient(&analysis.macd));
        let rsi = analysis.rsi.as_ref().unwrap();
        assert!(rsi.series.values()[5] > 70.0);
        assert_eq!(rsi.latest, SignalState::Sell);
        assert_eq!(analysis.bollinger.as_ref().unwrap().latest, SignalState::Sell);
        assert_eq!(analysis.recommendation, Some(Recommendation::Sell));
    }

    #[test]
    fn short_history_reports_each_indicator() {
        let bars = bars_from_closes(&[10.0; 10]);
        let analysis = analyze(&bars, PriceField::Close, &IndicatorSettings::default()).unwrap();
        assert!(is_insufficient(&analysis.macd));
        assert!(is_insufficient(&analysis.rsi));
        assert!(is_insufficient(&analysis.bollinger));
        assert_eq!(analysis.recommendation, None);

        let closes: Vec<f64> = (0..15).map(|i| 10.0 + (i % 3) as f64).collect();
        let bars = bars_from_closes(&closes);
        let analysis = analyze(&bars, PriceField::Close, &IndicatorSettings::default()).unwrap();
        assert!(is_insufficient(&analysis.macd));
        assert!(analysis.rsi.is_ok());
        assert!(is_insufficient(&analysis.bollinger));
        assert_eq!(analysis.recommendation, None);
    }

    #[test]
    fn analysis_is_idempotent_and_leaves_input_untouched() {
        let closes: Vec<f64> = (0..80)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.1)
            .collect();
        let bars = bars_from_closes(&closes);
        let before = bars.clone();
        let settings = IndicatorSettings::default();

        let first = analyze(&bars, PriceField::Close, &settings).unwrap();
        let second = analyze(&bars, PriceField::Close, &settings).unwrap();

        assert_eq!(bars, before);
        assert_eq!(
            first.macd.as_ref().unwrap().series,
            second.macd.as_ref().unwrap().series
        );
        assert_eq!(
            first.rsi.as_ref().unwrap().series,
            second.rsi.as_ref().unwrap().series
        );
        assert_eq!(
            first.bollinger.as_ref().unwrap().series,
            second.bollinger.as_ref().unwrap().series
        );
        assert_eq!(first.recommendation, second.recommendation);
    }

    #[test]
    fn series_lengths_follow_lookback() {
        let bars = bars_from_closes(&(0..60).map(|i| i as f64).collect::<Vec<_>>());
        let analysis = analyze(&bars, PriceField::Close, &IndicatorSettings::default()).unwrap();
        assert_eq!(analysis.macd.as_ref().unwrap().series.values().len(), 60 - 34 + 1);
        assert_eq!(analysis.rsi.as_ref().unwrap().series.values().len(), 60 - 15 + 1);
        assert_eq!(analysis.bollinger.as_ref().unwrap().series.values().len(), 60 - 20 + 1);
    }

    #[test]
    fn unordered_bars_rejected() {
        let mut bars = bars_from_closes(&[1.0, 2.0, 3.0]);
        bars[2].date = bars[1].date;
        let err = analyze(&bars, PriceField::Close, &IndicatorSettings::default()).unwrap_err();
        assert!(matches!(
            err.current_context(),
            SignalError::UnorderedBars { index: 2 }
        ));
    }

    #[test]
    fn invalid_settings_rejected() {
        let bars = bars_from_closes(&[1.0; 40]);
        let settings = IndicatorSettings {
            macd_fast: 26,
            macd_slow: 12,
            ..IndicatorSettings::default()
        };
        let err = analyze(&bars, PriceField::Close, &settings).unwrap_err();
        assert!(matches!(
            err.current_context(),
            SignalError::InvalidConfiguration { .. }
        ));
    }

    #[test]
    fn adjusted_close_feeds_indicators() {
        let mut bars = bars_from_closes(&[10.0; 25]);
        for (i, bar) in bars.iter_mut().enumerate() {
            bar.adj_close = Some(10.0 + i as f64);
        }
        let analysis = analyze(&bars, PriceField::AdjClose, &IndicatorSettings::default()).unwrap();
        let band = analysis.bollinger.as_ref().unwrap().latest_value().unwrap();
        assert!(band.upper > band.lower);
    }

    #[test]
    fn macd_bias_follows_histogram_sign() {
        let closes: Vec<f64> = (0..50).map(|i| 100.0 * 1.02_f64.powi(i)).collect();
        let bars = bars_from_closes(&closes);
        let analysis = analyze(&bars, PriceField::Close, &IndicatorSettings::default()).unwrap();
        assert_eq!(analysis.macd_bias(), Some(Bias::Bullish));

        let flat = analyze(
            &bars_from_closes(&[5.0; 10]),
            PriceField::Close,
            &IndicatorSettings::default(),
        )
        .unwrap();
        assert_eq!(flat.macd_bias(), None);
    }
}
