//! Remap table: exchange-format identifiers that have a general-provider equivalent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;

use super::traits::RemapSource;

/// General-provider equivalent of an exchange identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapEntry {
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Raw identifier (upper-case) -> general-provider equivalent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapTable {
    entries: HashMap<String, RemapEntry>,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the JSON object form `{"<raw>": {"symbol": "...", "name": "..."}}`.
    pub fn from_json(json: &str) -> Result<Self, MarketDataError> {
        let raw: HashMap<String, RemapEntry> = serde_json::from_str(json)
            .map_err(|e| MarketDataError::RemapUnavailable(format!("invalid remap JSON: {}", e)))?;

        Ok(Self {
            entries: raw
                .into_iter()
                .map(|(k, v)| (k.trim().to_uppercase(), v))
                .collect(),
        })
    }

    pub fn insert(&mut self, raw: impl Into<String>, entry: RemapEntry) {
        self.entries.insert(raw.into().trim().to_uppercase(), entry);
    }

    pub fn with_entry(mut self, raw: &str, symbol: &str, name: Option<&str>) -> Self {
        self.insert(
            raw,
            RemapEntry {
                symbol: symbol.to_string(),
                name: name.map(str::to_string),
            },
        );
        self
    }

    pub fn get(&self, identifier: &str) -> Option<&RemapEntry> {
        self.entries.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reads the remap table from a JSON file on every load.
#[derive(Debug, Clone)]
pub struct JsonRemapSource {
    path: PathBuf,
}

impl JsonRemapSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RemapSource for JsonRemapSource {
    fn load(&self) -> Result<RemapTable, MarketDataError> {
        let json = std::fs::read_to_string(&self.path).map_err(|e| {
            MarketDataError::RemapUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        let table = RemapTable::from_json(&json)?;
        debug!(
            "Loaded {} remap entries from {}",
            table.len(),
            self.path.display()
        );
        Ok(table)
    }
}

/// In-memory remap table.
#[derive(Debug, Clone, Default)]
pub struct StaticRemapSource {
    table: RemapTable,
}

impl StaticRemapSource {
    pub fn new(table: RemapTable) -> Self {
        Self { table }
    }

    /// A source with no remappings.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl RemapSource for StaticRemapSource {
    fn load(&self) -> Result<RemapTable, MarketDataError> {
        Ok(self.table.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_json_keys_are_normalized() {
        let table =
            RemapTable::from_json(r#"{" 1159250 ": {"symbol": "SPY", "name": "SPDR S&P 500"}}"#)
                .unwrap();
        let entry = table.get("1159250").unwrap();
        assert_eq!(entry.symbol, "SPY");
        assert_eq!(entry.name.as_deref(), Some("SPDR S&P 500"));
    }

    #[test]
    fn test_name_is_optional() {
        let table = RemapTable::from_json(r#"{"1": {"symbol": "X"}}"#).unwrap();
        assert_eq!(table.get("1").unwrap().name, None);
    }

    #[test]
    fn test_invalid_json_is_unavailable() {
        let err = RemapTable::from_json("[1, 2]").unwrap_err();
        assert!(matches!(err, MarketDataError::RemapUnavailable(_)));
    }

    #[test]
    fn test_json_source_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"1159250": {{"symbol": "SPY"}}}}"#).unwrap();

        let table = JsonRemapSource::new(file.path()).load().unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_json_source_missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonRemapSource::new(dir.path().join("missing.json"));
        assert!(matches!(
            source.load(),
            Err(MarketDataError::RemapUnavailable(_))
        ));
    }
}
