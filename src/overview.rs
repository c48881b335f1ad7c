use std::sync::Arc;

use error_stack::{Report, ResultExt};
use tracing::{info, warn};

use crate::error::OverviewError;
use crate::model::{PriceBar, Recommendation, Timeframe};
use crate::signal::{Analysis, IndicatorSettings, analyze};
use crate::source::DataSource;

/// Bars and derived signals for one ticker at one point in time.
#[derive(Debug)]
pub struct Snapshot {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bars: Vec<PriceBar>,
    pub analysis: Analysis,
}

impl Snapshot {
    pub fn last_bar(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    /// Latest price in the field the indicators were computed from.
    pub fn last_price(&self) -> Option<f64> {
        self.last_bar()
            .map(|bar| bar.price(self.timeframe.price_field()))
    }

    pub fn recommendation(&self) -> Option<Recommendation> {
        self.analysis.recommendation
    }
}

#[derive(Debug)]
pub struct OverviewRow {
    pub symbol: String,
    pub outcome: Result<Snapshot, Report<OverviewError>>,
}

/// Fetch bars for `symbol` and run the analysis over them.
pub async fn load_snapshot(
    source: &dyn DataSource,
    symbol: &str,
    timeframe: Timeframe,
    settings: &IndicatorSettings,
) -> Result<Snapshot, Report<OverviewError>> {
    let bars = source
        .fetch_bars(symbol, timeframe)
        .await
        .change_context(OverviewError::Fetch {
            symbol: symbol.to_owned(),
        })?;

    let analysis = analyze(&bars, timeframe.price_field(), settings).change_context(
        OverviewError::Analysis {
            symbol: symbol.to_owned(),
        },
    )?;

    Ok(Snapshot {
        symbol: symbol.to_owned(),
        timeframe,
        bars,
        analysis,
    })
}

/// Refresh every symbol concurrently, one task per symbol.
///
/// A failing symbol yields an error row and never aborts the others.
pub async fn refresh(
    source: Arc<dyn DataSource>,
    symbols: &[String],
    timeframe: Timeframe,
    settings: &IndicatorSettings,
) -> Vec<OverviewRow> {
    let handles: Vec<_> = symbols
        .iter()
        .map(|symbol| {
            let source = Arc::clone(&source);
            let task_symbol = symbol.clone();
            let settings = settings.clone();
            let handle = tokio::spawn(async move {
                load_snapshot(source.as_ref(), &task_symbol, timeframe, &settings).await
            });
            (symbol.clone(), handle)
        })
        .collect();

    let mut rows = Vec::with_capacity(handles.len());
    for (symbol, handle) in handles {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(Report::new(e).change_context(OverviewError::Task {
                symbol: symbol.clone(),
            })),
        };
        if let Err(e) = &outcome {
            warn!(symbol = %symbol, error = ?e, "overview refresh failed");
        }
        rows.push(OverviewRow { symbol, outcome });
    }

    sort_rows(&mut rows);

    info!(
        source = source.name(),
        timeframe = %timeframe,
        symbols = rows.len(),
        failed = rows.iter().filter(|r| r.outcome.is_err()).count(),
        "overview refresh complete"
    );

    rows
}

/// Successful rows by recommendation (BUY, HOLD, SELL, none) then symbol;
/// failed rows last, by symbol.
pub fn sort_rows(rows: &mut [OverviewRow]) {
    rows.sort_by(|a, b| row_rank(a).cmp(&row_rank(b)).then_with(|| a.symbol.cmp(&b.symbol)));
}

fn row_rank(row: &OverviewRow) -> u8 {
    match &row.outcome {
        Ok(snapshot) => snapshot.recommendation().map_or(3, Recommendation::rank),
        Err(_) => 4,
    }
}
