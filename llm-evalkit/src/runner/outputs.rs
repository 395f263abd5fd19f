//! Work directory layout and atomic persistence

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::reporting::SubsetReport;

/// Directory layout of one run.
///
/// ```text
/// <work_dir>/configs/task_config_<hash>.yaml
/// <work_dir>/outputs/<model>/<dataset>/<subset>.json
/// <work_dir>/reports/<model>/<dataset>.json
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OutputsStructure {
    pub work_dir: PathBuf,
    pub configs_dir: PathBuf,
    pub outputs_dir: PathBuf,
    pub reports_dir: PathBuf,
}

impl OutputsStructure {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        Self {
            configs_dir: work_dir.join("configs"),
            outputs_dir: work_dir.join("outputs"),
            reports_dir: work_dir.join("reports"),
            work_dir,
        }
    }

    pub fn config_path(&self, hash: &str) -> PathBuf {
        self.configs_dir.join(format!("task_config_{}.yaml", hash))
    }

    pub fn subset_path(&self, model: &str, dataset: &str, subset: &str) -> PathBuf {
        self.outputs_dir
            .join(path_component(model))
            .join(path_component(dataset))
            .join(format!("{}.json", path_component(subset)))
    }

    pub fn report_path(&self, model: &str, dataset: &str) -> PathBuf {
        self.reports_dir
            .join(path_component(model))
            .join(format!("{}.json", path_component(dataset)))
    }

    /// A persisted subset report, if one exists and parses.
    pub fn cached_subset(&self, model: &str, dataset: &str, subset: &str) -> Option<SubsetReport> {
        let path = self.subset_path(model, dataset, subset);
        if !path.is_file() {
            return None;
        }
        match SubsetReport::read_from_file(&path) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!("Ignoring unreadable cached result {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Model ids such as `org/name` become a single path component.
fn path_component(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

/// Write `bytes` to `path` through a temp file in the same directory, so a
/// reader never sees a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    write_atomic(path, &json)
}
