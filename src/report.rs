use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use error_stack::Report;
use serde::Serialize;

use crate::error::{SignalError, SourceError};
use crate::indicator::bollinger::BandPoint;
use crate::indicator::macd::MacdPoint;
use crate::model::{PriceBar, Quote, Recommendation, SignalState, Timeframe};
use crate::overview::{OverviewRow, Snapshot};
use crate::signal::Outcome;

pub fn state_dot(state: Option<SignalState>) -> &'static str {
    match state {
        Some(SignalState::Buy) => "🟢",
        Some(SignalState::Hold) => "🟡",
        Some(SignalState::Sell) => "🔴",
        None => "⚪",
    }
}

fn recommendation_label(recommendation: Option<Recommendation>) -> String {
    recommendation.map_or_else(|| "N/A".to_string(), |r| r.to_string())
}

fn date_label(date: DateTime<Utc>, timeframe: Timeframe) -> String {
    if timeframe.is_intraday() {
        date.format("%Y-%m-%d %H:%M").to_string()
    } else {
        date.format("%Y-%m-%d").to_string()
    }
}

/// Overview table followed by one line per failed ticker.
pub fn render_overview(rows: &[OverviewRow], timeframe: Timeframe) -> String {
    let mut out = String::new();
    if rows.is_empty() {
        out.push_str("Watchlist is empty. Add a ticker with `watch add <SYMBOL>`.\n");
        return out;
    }

    let _ = writeln!(
        out,
        "{:<10} {:>12}  {:<4} {:<4} {:<4} {:<6} {}",
        "TICKER", "PRICE", "MACD", "RSI", "BB", "SIGNAL", "TIME"
    );
    for row in rows {
        let Ok(snapshot) = &row.outcome else {
            continue;
        };
        let [macd, rsi, bb] = snapshot.analysis.states();
        let price = snapshot
            .last_price()
            .map_or_else(|| "-".to_string(), |p| format!("{p:.2}"));
        let time = snapshot
            .last_bar()
            .map_or_else(|| "-".to_string(), |bar| date_label(bar.date, timeframe));
        let _ = writeln!(
            out,
            "{:<10} {:>12}  {:<3} {:<3} {:<3} {:<6} {}",
            row.symbol,
            price,
            state_dot(macd),
            state_dot(rsi),
            state_dot(bb),
            recommendation_label(snapshot.recommendation()),
            time
        );
    }

    for row in rows {
        if let Err(e) = &row.outcome {
            match root_cause(e) {
                Some(cause) => {
                    let _ = writeln!(out, "! {}: {} ({cause})", row.symbol, e.current_context());
                }
                None => {
                    let _ = writeln!(out, "! {}: {}", row.symbol, e.current_context());
                }
            }
        }
    }
    out
}

/// The provider or analysis error underneath a failed row, if any.
fn root_cause<C>(e: &Report<C>) -> Option<String> {
    e.downcast_ref::<SourceError>()
        .map(ToString::to_string)
        .or_else(|| e.downcast_ref::<SignalError>().map(ToString::to_string))
}

fn age_label(age: usize) -> String {
    match age {
        1 => "1 bar".to_string(),
        n => format!("{n} bars"),
    }
}

fn unavailable_reason(e: &Report<SignalError>) -> String {
    e.current_context().to_string()
}

fn indicator_line<T: Copy>(
    out: &mut String,
    label: &str,
    outcome: &Outcome<T>,
    describe: impl Fn(&T) -> String,
) {
    match outcome {
        Ok(report) => {
            let value = report
                .latest_value()
                .map(|v| describe(&v))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "  {} {:<10} {:<44} {:<4} for {}",
                state_dot(Some(report.latest)),
                label,
                value,
                report.latest,
                age_label(report.age)
            );
        }
        Err(e) => {
            let _ = writeln!(
                out,
                "  {} {:<10} n/a: {}",
                state_dot(None),
                label,
                unavailable_reason(e)
            );
        }
    }
}

/// Latest values, states and ages for one ticker.
pub fn render_detail(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    let analysis = &snapshot.analysis;

    let _ = write!(
        out,
        "{} [{}] {} bars",
        snapshot.symbol, snapshot.timeframe, analysis.bar_count
    );
    if let (Some(bar), Some(price)) = (snapshot.last_bar(), snapshot.last_price()) {
        let _ = write!(
            out,
            ", last {price:.2} at {}",
            date_label(bar.date, snapshot.timeframe)
        );
    }
    out.push('\n');

    let bias = analysis.macd_bias();
    indicator_line(&mut out, "MACD", &analysis.macd, |p: &MacdPoint| {
        let mut s = format!(
            "line {:.4} signal {:.4} hist {:.4}",
            p.line, p.signal, p.histogram
        );
        if let Some(bias) = bias {
            let _ = write!(s, " {}", bias.as_str());
        }
        s
    });
    indicator_line(&mut out, "RSI", &analysis.rsi, |v: &f64| format!("{v:.2}"));
    indicator_line(&mut out, "Bollinger", &analysis.bollinger, |b: &BandPoint| {
        format!("{:.2} / {:.2} / {:.2}", b.lower, b.middle, b.upper)
    });

    let [macd, rsi, bb] = analysis.states();
    let _ = writeln!(
        out,
        "Signals: {} {} {} -> {}",
        state_dot(macd),
        state_dot(rsi),
        state_dot(bb),
        recommendation_label(analysis.recommendation)
    );
    out
}

pub fn render_quotes(quotes: &[Quote]) -> String {
    if quotes.is_empty() {
        return "No matches.\n".to_string();
    }
    let mut out = String::new();
    for q in quotes {
        let _ = writeln!(out, "{:<12} {:<40} {}", q.symbol, q.name, q.exchange);
    }
    out
}

// ── Chart export ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct FlipMarker {
    pub index: usize,
    pub date: DateTime<Utc>,
    pub state: SignalState,
}

/// One indicator laid out bar by bar; `null` during warm-up.
#[derive(Debug, Serialize)]
pub struct IndicatorTrack<T> {
    pub values: Vec<Option<T>>,
    pub states: Vec<Option<SignalState>>,
    pub flips: Vec<FlipMarker>,
    pub latest: Option<SignalState>,
    pub age: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChartExport<'a> {
    pub symbol: &'a str,
    pub timeframe: &'static str,
    pub bars: &'a [PriceBar],
    pub macd: IndicatorTrack<MacdPoint>,
    pub rsi: IndicatorTrack<f64>,
    pub bollinger: IndicatorTrack<BandPoint>,
    pub recommendation: Option<Recommendation>,
}

impl<'a> ChartExport<'a> {
    pub fn new(snapshot: &'a Snapshot) -> Self {
        let bars = snapshot.bars.as_slice();
        Self {
            symbol: &snapshot.symbol,
            timeframe: snapshot.timeframe.as_str(),
            bars,
            macd: track(&snapshot.analysis.macd, bars),
            rsi: track(&snapshot.analysis.rsi, bars),
            bollinger: track(&snapshot.analysis.bollinger, bars),
            recommendation: snapshot.analysis.recommendation,
        }
    }
}

fn track<T: Copy>(outcome: &Outcome<T>, bars: &[PriceBar]) -> IndicatorTrack<T> {
    match outcome {
        Ok(report) => IndicatorTrack {
            values: report.series.aligned(bars.len()),
            states: report.aligned_states(bars.len()),
            flips: report
                .flips()
                .into_iter()
                .filter_map(|(index, state)| {
                    bars.get(index).map(|bar| FlipMarker {
                        index,
                        date: bar.date,
                        state,
                    })
                })
                .collect(),
            latest: Some(report.latest),
            age: Some(report.age),
            unavailable: None,
        },
        Err(e) => IndicatorTrack {
            values: vec![None; bars.len()],
            states: vec![None; bars.len()],
            flips: Vec::new(),
            latest: None,
            age: None,
            unavailable: Some(unavailable_reason(e)),
        },
    }
}
