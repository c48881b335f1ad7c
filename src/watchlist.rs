use std::path::{Path, PathBuf};

use error_stack::{Report, ResultExt, bail};
use serde_json::Value;
use tracing::info;

use crate::error::WatchlistError;

/// Ordered, duplicate-free list of upper-case ticker symbols.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watchlist {
    symbols: Vec<String>,
}

impl Watchlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `symbol` after trimming and upper-casing it.
    ///
    /// Returns `false` for a malformed symbol or one already present.
    pub fn add(&mut self, symbol: &str) -> bool {
        let symbol = normalize_symbol(symbol);
        if !is_valid_symbol(&symbol) || self.symbols.contains(&symbol) {
            return false;
        }
        self.symbols.push(symbol);
        true
    }

    pub fn remove(&mut self, symbol: &str) -> bool {
        let symbol = normalize_symbol(symbol);
        let before = self.symbols.len();
        self.symbols.retain(|s| *s != symbol);
        self.symbols.len() != before
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(&normalize_symbol(symbol))
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Parse `{"watchlist": [...]}` or a bare array of symbols.
    ///
    /// Non-string entries are skipped; symbols are normalized and deduplicated.
    pub fn from_json(content: &str) -> Result<Self, Report<WatchlistError>> {
        let value: Value = serde_json::from_str(content).change_context(WatchlistError::Parse {
            reason: "invalid JSON".into(),
        })?;

        let entries = match &value {
            Value::Array(items) => items,
            Value::Object(map) => match map.get("watchlist") {
                Some(Value::Array(items)) => items,
                _ => bail!(WatchlistError::Parse {
                    reason: "expected a \"watchlist\" array".into(),
                }),
            },
            _ => bail!(WatchlistError::Parse {
                reason: "expected an array or an object".into(),
            }),
        };

        let mut watchlist = Self::new();
        for symbol in entries.iter().filter_map(Value::as_str) {
            watchlist.add(symbol);
        }
        Ok(watchlist)
    }

    /// Pretty-printed JSON array of symbols.
    pub fn to_json(&self) -> Result<String, Report<WatchlistError>> {
        serde_json::to_string_pretty(&self.symbols).change_context(WatchlistError::Write)
    }
}

fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Ticker characters Yahoo uses: `BRK-B`, `^GSPC`, `EURUSD=X`, `7203.T`.
pub fn is_valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '^' | '=' | '-'))
}

/// Watchlist persisted as JSON at a fixed path.
pub struct WatchlistStore {
    path: PathBuf,
}

impl WatchlistStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// A missing file is an empty watchlist.
    pub fn load(&self) -> Result<Watchlist, Report<WatchlistError>> {
        if !self.path.exists() {
            return Ok(Watchlist::new());
        }
        read_file(&self.path)
    }

    pub fn save(&self, watchlist: &Watchlist) -> Result<(), Report<WatchlistError>> {
        write_file(&self.path, watchlist)
    }

    /// Replace the stored watchlist with the one in `source`.
    pub fn import(&self, source: &Path) -> Result<Watchlist, Report<WatchlistError>> {
        let watchlist = read_file(source)?;
        self.save(&watchlist)?;
        info!(
            source = %source.display(),
            symbols = watchlist.len(),
            "watchlist imported"
        );
        Ok(watchlist)
    }

    pub fn export(&self, dest: &Path) -> Result<Watchlist, Report<WatchlistError>> {
        let watchlist = self.load()?;
        write_file(dest, &watchlist)?;
        info!(dest = %dest.display(), symbols = watchlist.len(), "watchlist exported");
        Ok(watchlist)
    }
}

fn read_file(path: &Path) -> Result<Watchlist, Report<WatchlistError>> {
    let content = std::fs::read_to_string(path)
        .change_context(WatchlistError::Read)
        .attach_with(|| format!("path: {}", path.display()))?;
    Watchlist::from_json(&content).attach_with(|| format!("path: {}", path.display()))
}

fn write_file(path: &Path, watchlist: &Watchlist) -> Result<(), Report<WatchlistError>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .change_context(WatchlistError::Write)
            .attach_with(|| format!("cannot create directory: {}", parent.display()))?;
    }
    std::fs::write(path, watchlist.to_json()?)
        .change_context(WatchlistError::Write)
        .attach_with(|| format!("path: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "signal-watch-{name}-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn add_normalizes_and_dedups() {
        let mut wl = Watchlist::new();
        assert!(wl.add(" aapl "));
        assert!(!wl.add("AAPL"));
        assert!(!wl.add("   "));
        assert!(wl.add("msft"));
        assert_eq!(wl.symbols(), ["AAPL", "MSFT"]);
        assert!(wl.contains("aapl"));
    }

    #[test]
    fn add_rejects_malformed_symbols() {
        let mut wl = Watchlist::new();
        for bad in ["AAPL/../X", "MSFT?range=max", "A B", "ÄPFEL", "#"] {
            assert!(!wl.add(bad), "{bad} accepted");
        }
        for good in ["brk-b", "^gspc", "eurusd=x", "7203.t"] {
            assert!(wl.add(good), "{good} rejected");
        }
        assert_eq!(wl.symbols(), ["BRK-B", "^GSPC", "EURUSD=X", "7203.T"]);

        let wl = Watchlist::from_json(r#"["AAPL", "../etc", "KO"]"#).unwrap();
        assert_eq!(wl.symbols(), ["AAPL", "KO"]);
    }

    #[test]
    fn remove_reports_whether_present() {
        let mut wl = Watchlist::new();
        wl.add("AAPL");
        assert!(wl.remove("aapl"));
        assert!(!wl.remove("AAPL"));
        assert!(wl.is_empty());
    }

    #[test]
    fn from_json_accepts_object_and_array() {
        let wl = Watchlist::from_json(r#"{"watchlist": ["aapl", 42, "MSFT", "Aapl", null]}"#)
            .unwrap();
        assert_eq!(wl.symbols(), ["AAPL", "MSFT"]);

        let wl = Watchlist::from_json(r#"["spy", "qqq"]"#).unwrap();
        assert_eq!(wl.symbols(), ["SPY", "QQQ"]);
    }

    #[test]
    fn from_json_rejects_other_shapes() {
        for body in [r#"{"symbols": ["AAPL"]}"#, "42", "not json"] {
            let err = Watchlist::from_json(body).unwrap_err();
            assert!(matches!(
                err.current_context(),
                WatchlistError::Parse { .. }
            ));
        }
    }

    #[test]
    fn to_json_writes_plain_array() {
        let mut wl = Watchlist::new();
        wl.add("AAPL");
        wl.add("KO");
        let value: Value = serde_json::from_str(&wl.to_json().unwrap()).unwrap();
        assert_eq!(value, serde_json::json!(["AAPL", "KO"]));
    }

    #[test]
    fn store_missing_file_loads_empty() {
        let dir = temp_dir("missing");
        let store = WatchlistStore::new(dir.join("watchlist.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn store_save_creates_directories_and_round_trips() {
        let dir = temp_dir("save");
        let store = WatchlistStore::new(dir.join("nested").join("watchlist.json"));
        let mut wl = Watchlist::new();
        wl.add("NVDA");
        wl.add("TSLA");
        store.save(&wl).unwrap();
        assert_eq!(store.load().unwrap(), wl);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn import_replaces_and_export_writes_copy() {
        let dir = temp_dir("import");
        std::fs::create_dir_all(&dir).unwrap();
        let incoming = dir.join("incoming.json");
        std::fs::write(&incoming, r#"{"watchlist": ["ibm", "ko"]}"#).unwrap();

        let store = WatchlistStore::new(dir.join("watchlist.json"));
        let mut old = Watchlist::new();
        old.add("AAPL");
        store.save(&old).unwrap();

        let imported = store.import(&incoming).unwrap();
        assert_eq!(imported.symbols(), ["IBM", "KO"]);
        assert_eq!(store.load().unwrap(), imported);

        let exported = dir.join("out").join("copy.json");
        store.export(&exported).unwrap();
        let copy = Watchlist::from_json(&std::fs::read_to_string(&exported).unwrap()).unwrap();
        assert_eq!(copy, imported);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn import_of_bad_file_keeps_existing_list() {
        let dir = temp_dir("bad-import");
        std::fs::create_dir_all(&dir).unwrap();
        let incoming = dir.join("broken.json");
        std::fs::write(&incoming, "{").unwrap();

        let store = WatchlistStore::new(dir.join("watchlist.json"));
        let mut wl = Watchlist::new();
        wl.add("AAPL");
        store.save(&wl).unwrap();

        assert!(store.import(&incoming).is_err());
        assert_eq!(store.load().unwrap(), wl);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
