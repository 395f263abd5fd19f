//! Dataset records and the sources that provide them
//!
//! The harness only needs the records of a named split for a subset. Where
//! those records come from (a hub download, a local mirror, memory) is up to
//! the [`DatasetSource`] implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

/// One raw dataset row.
pub type Record = serde_json::Map<String, Value>;

/// Error type for dataset loading
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("No data for subset `{subset}` split `{split}` under {root}")]
    NotFound {
        root: String,
        subset: String,
        split: String,
    },
}

/// Provider of dataset records.
pub trait DatasetSource: Send + Sync {
    /// Load every record of `split` for `subset` of the dataset rooted at `root`.
    fn load(&self, root: &Path, subset: &str, split: &str) -> Result<Vec<Record>, LoadError>;
}

/// Reads records from a local mirror.
///
/// Layout: `<root>/<subset>/<split>.jsonl` (one JSON object per line) or
/// `<root>/<subset>/<split>.json` (a JSON array of objects).
#[derive(Debug, Clone, Default)]
pub struct LocalDatasetSource;

impl LocalDatasetSource {
    pub fn new() -> Self {
        Self
    }

    fn candidates(root: &Path, subset: &str, split: &str) -> [PathBuf; 2] {
        let dir = root.join(subset);
        [
            dir.join(format!("{}.jsonl", split)),
            dir.join(format!("{}.json", split)),
        ]
    }
}

impl DatasetSource for LocalDatasetSource {
    fn load(&self, root: &Path, subset: &str, split: &str) -> Result<Vec<Record>, LoadError> {
        for path in Self::candidates(root, subset, split) {
            if !path.is_file() {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            let is_jsonl = path.extension().and_then(|e| e.to_str()) == Some("jsonl");
            return if is_jsonl {
                parse_jsonl(&content, &path)
            } else {
                parse_json_array(&content, &path)
            };
        }

        Err(LoadError::NotFound {
            root: root.display().to_string(),
            subset: subset.to_string(),
            split: split.to_string(),
        })
    }
}

/// Parse JSON Lines content into records, skipping blank lines.
pub fn parse_jsonl(content: &str, path: &Path) -> Result<Vec<Record>, LoadError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(record)) => Ok(record),
            Ok(other) => Err(LoadError::Parse {
                path: path.display().to_string(),
                message: format!("line {}: expected an object, got {}", idx + 1, other),
            }),
            Err(e) => Err(LoadError::Parse {
                path: path.display().to_string(),
                message: format!("line {}: {}", idx + 1, e),
            }),
        })
        .collect()
}

/// Parse a JSON array of objects into records.
pub fn parse_json_array(content: &str, path: &Path) -> Result<Vec<Record>, LoadError> {
    let parse_err = |message: String| LoadError::Parse {
        path: path.display().to_string(),
        message,
    };

    let value: Value = serde_json::from_str(content).map_err(|e| parse_err(e.to_string()))?;
    let Value::Array(rows) = value else {
        return Err(parse_err("expected a JSON array of objects".to_string()));
    };

    rows.into_iter()
        .enumerate()
        .map(|(idx, row)| match row {
            Value::Object(record) => Ok(record),
            other => Err(parse_err(format!("row {}: expected an object, got {}", idx, other))),
        })
        .collect()
}

/// In-memory records keyed by subset and split. The dataset root is ignored.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatasetSource {
    splits: HashMap<(String, String), Vec<Record>>,
}

impl MemoryDatasetSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the records of one split of one subset.
    pub fn with_split(
        mut self,
        subset: impl Into<String>,
        split: impl Into<String>,
        records: Vec<Record>,
    ) -> Self {
        self.splits.insert((subset.into(), split.into()), records);
        self
    }
}

impl DatasetSource for MemoryDatasetSource {
    fn load(&self, root: &Path, subset: &str, split: &str) -> Result<Vec<Record>, LoadError> {
        self.splits
            .get(&(subset.to_string(), split.to_string()))
            .cloned()
            .ok_or_else(|| LoadError::NotFound {
                root: root.display().to_string(),
                subset: subset.to_string(),
                split: split.to_string(),
            })
    }
}

/// Convert a JSON object literal into a [`Record`]; other values yield an empty record.
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}
