//! On-disk card store: one pretty-printed JSON array, replaced atomically.
//!
//! Writes go to a sibling temp file (`<base>.tmp.<pid>.<timestamp>.json`)
//! which is then renamed over the canonical path, so readers only ever see a
//! complete array.

use crate::model::sanitize;
use flashcard_types::Card;
use serde_json::Value;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Store file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Write queue unavailable: {0}")]
    QueueClosed(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// What `load` does when the store file is not a valid card array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseFailurePolicy {
    /// Log, rewrite the file as `[]`, and carry on with an empty collection.
    #[default]
    ResetToEmpty,
    /// Return `StoreError::Corrupt` and leave the file alone.
    FailFast,
}

impl ParseFailurePolicy {
    pub fn from_config(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reset" | "reset_to_empty" => Some(Self::ResetToEmpty),
            "fail" | "fail_fast" => Some(Self::FailFast),
            _ => None,
        }
    }
}

pub struct StoreFile {
    path: PathBuf,
    on_parse_failure: ParseFailurePolicy,
}

impl StoreFile {
    pub fn new(path: impl Into<PathBuf>, on_parse_failure: ParseFailurePolicy) -> Self {
        Self {
            path: path.into(),
            on_parse_failure,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure the parent directory exists and seed an empty array if the
    /// file is missing. Leaves an existing file untouched.
    pub fn init(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err(dir))?;
        }
        if !self.path.exists() {
            log::info!("[CARD_STORE] Creating empty store at {}", self.path.display());
            self.save(&[])?;
        }
        Ok(())
    }

    /// Read and parse the whole collection.
    ///
    /// Only a file that is not a JSON array counts as corrupt. Each record is
    /// re-normalized, so legacy field names and loosely-typed values still
    /// load; records that cannot be recovered are skipped and logged.
    pub fn load(&self) -> Result<Vec<Card>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!(
                    "[CARD_STORE] Store file {} missing, recreating",
                    self.path.display()
                );
                self.save(&[])?;
                return Ok(Vec::new());
            }
            Err(e) => return Err(io_err(&self.path)(e)),
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(records)) => Ok(self.restore_records(&records)),
            Ok(_) => self.recover("top-level value is not an array".to_string()),
            Err(e) => self.recover(e.to_string()),
        }
    }

    fn restore_records(&self, records: &[Value]) -> Vec<Card> {
        records
            .iter()
            .enumerate()
            .filter_map(|(i, record)| {
                let card = sanitize(record);
                if card.is_none() {
                    log::warn!(
                        "[CARD_STORE] Skipping unrecoverable record #{} in {}",
                        i,
                        self.path.display()
                    );
                }
                card
            })
            .collect()
    }

    fn recover(&self, cause: String) -> Result<Vec<Card>> {
        match self.on_parse_failure {
            ParseFailurePolicy::ResetToEmpty => {
                log::error!(
                    "[CARD_STORE] Failed to parse {}: {}. Resetting to empty collection",
                    self.path.display(),
                    cause
                );
                self.save(&[])?;
                Ok(Vec::new())
            }
            ParseFailurePolicy::FailFast => {
                log::error!(
                    "[CARD_STORE] Failed to parse {}: {}",
                    self.path.display(),
                    cause
                );
                Err(StoreError::Corrupt {
                    path: self.path.clone(),
                    reason: cause,
                })
            }
        }
    }

    /// Replace the collection on disk. The rename is the only step that
    /// touches the canonical path.
    pub fn save(&self, cards: &[Card]) -> Result<()> {
        let json = serde_json::to_string_pretty(cards)?;
        let tmp = self.temp_path();

        if let Err(e) = write_synced(&tmp, json.as_bytes()) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(&tmp)(e));
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(&self.path)(e));
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let base = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("cards");
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}.tmp.{}.{}-{}.json", base, std::process::id(), nanos, seq);
        self.path.with_file_name(name)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(id: &str) -> Card {
        Card {
            id: id.to_string(),
            front: "casa".to_string(),
            back: "Haus".to_string(),
            lang_from: "pt".to_string(),
            lang_to: "de".to_string(),
            tags: vec!["noun".to_string()],
            ease: 2.5,
            interval: 0.0,
            next_review: "2024-01-01T00:00:00.000Z".to_string(),
            lapses: 0,
            created_at: "2024-01-01T00:00:00.000Z".to_string(),
        }
    }

    fn leftover_temp_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .count()
    }

    #[test]
    fn test_init_creates_dir_and_empty_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cards.json");
        let store = StoreFile::new(&path, ParseFailurePolicy::default());

        store.init().unwrap();
        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, Value::Array(vec![]));
    }

    #[test]
    fn test_init_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cards.json");
        let store = StoreFile::new(&path, ParseFailurePolicy::default());

        store.init().unwrap();
        store.save(&[sample("a")]).unwrap();
        store.init().unwrap();
        assert_eq!(store.load().unwrap(), vec![sample("a")]);
    }

    #[test]
    fn test_save_then_load_pretty_printed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cards.json");
        let store = StoreFile::new(&path, ParseFailurePolicy::default());
        store.init().unwrap();

        store.save(&[sample("a"), sample("b")]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\n  {"));
        assert_eq!(store.load().unwrap().len(), 2);
        assert_eq!(leftover_temp_files(dir.path()), 0);
    }

    #[test]
    fn test_temp_path_naming() {
        let store = StoreFile::new("/data/cards.json", ParseFailurePolicy::default());
        let first = store.temp_path();
        let second = store.temp_path();
        let name = first.file_name().unwrap().to_string_lossy().to_string();

        assert_eq!(first.parent(), Some(Path::new("/data")));
        assert!(name.starts_with(&format!("cards.tmp.{}.", std::process::id())));
        assert!(name.ends_with(".json"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_corrupt_file_resets_to_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cards.json");
        fs::write(&path, "[{\"id\": broken").unwrap();
        let store = StoreFile::new(&path, ParseFailurePolicy::ResetToEmpty);

        assert!(store.load().unwrap().is_empty());
        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, Value::Array(vec![]));
    }

    #[test]
    fn test_corrupt_file_fail_fast_leaves_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cards.json");
        fs::write(&path, "{\"not\": \"an array\"}").unwrap();
        let store = StoreFile::new(&path, ParseFailurePolicy::FailFast);

        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"not\": \"an array\"}");
    }

    #[test]
    fn test_missing_file_is_recreated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cards.json");
        let store = StoreFile::new(&path, ParseFailurePolicy::FailFast);

        assert!(store.load().unwrap().is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_lenient_fields_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cards.json");
        fs::write(&path, r#"[{"id": "x", "front": "a", "back": "b"}]"#).unwrap();
        let store = StoreFile::new(&path, ParseFailurePolicy::FailFast);

        let cards = store.load().unwrap();
        assert_eq!(cards[0].lang_from, "pt");
        assert_eq!(cards[0].ease, 2.5);
    }

    #[test]
    fn test_loosely_typed_records_are_recovered_not_wiped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cards.json");
        fs::write(
            &path,
            r#"[
                {"id": "a", "front": "casa", "back": "Haus", "interval": 3,
                 "created_at": "2023-05-01T00:00:00.000Z", "next_review": "2023-05-04T00:00:00.000Z"},
                {"id": "b", "portuguese": "gato", "translation": "Katze"},
                {"id": "c", "front": "x", "back": "y", "ease": null, "lapses": -1},
                {"id": 7, "front": "sete", "back": "sieben", "lapses": 1.5},
                {"id": "d", "front": "", "back": "lost"},
                "stray"
            ]"#,
        )
        .unwrap();
        let store = StoreFile::new(&path, ParseFailurePolicy::ResetToEmpty);

        let cards = store.load().unwrap();
        let ids: Vec<&str> = cards.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "7"]);
        assert_eq!(cards[0].interval, 3.0);
        assert_eq!(cards[0].created_at, "2023-05-01T00:00:00.000Z");
        assert_eq!(cards[0].next_review, "2023-05-04T00:00:00.000Z");
        assert_eq!(cards[1].front, "gato");
        assert_eq!(cards[1].back, "Katze");
        assert_eq!(cards[2].ease, 2.5);
        assert_eq!(cards[2].lapses, 0);
        assert_eq!(cards[3].lapses, 1);

        // The file itself is left as it was; only a write rewrites it.
        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.as_array().unwrap().len(), 6);
    }

    #[test]
    fn test_policy_from_config() {
        assert_eq!(
            ParseFailurePolicy::from_config("reset"),
            Some(ParseFailurePolicy::ResetToEmpty)
        );
        assert_eq!(
            ParseFailurePolicy::from_config("FAIL"),
            Some(ParseFailurePolicy::FailFast)
        );
        assert_eq!(ParseFailurePolicy::from_config("backup"), None);
    }
}
