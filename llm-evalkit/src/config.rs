//! Task configuration
//!
//! A [`TaskConfig`] describes one evaluation run: which model, which
//! benchmarks, how to generate, where to write results. It can be built from
//! literal fields, a JSON value, or a YAML/JSON file.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use md5::{Digest, Md5};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::benchmarks;
use crate::models::custom::CustomModel;

/// Default root directory for run outputs.
pub const DEFAULT_WORK_DIR: &str = "outputs";
/// Default root directory of local dataset mirrors.
pub const DEFAULT_DATASET_DIR: &str = "data";
/// Default random seed.
pub const DEFAULT_SEED: u64 = 42;

/// Error type for configuration handling. Always fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported config format: {0} (expected .yaml, .yml or .json)")]
    UnsupportedFormat(String),

    #[error("Both `model` and `datasets` must be set for a native run")]
    MissingModelOrDatasets,

    #[error("Unknown benchmark `{name}`; registered: {available}")]
    UnknownBenchmark { name: String, available: String },

    #[error("Benchmark `{0}` requires `local_path` in dataset_args")]
    MissingLocalPath(String),

    #[error("Local dataset path for `{dataset}` does not exist: {}", .path.display())]
    LocalPathNotFound { dataset: String, path: PathBuf },

    #[error("eval_type `custom` needs an in-process model, got `{0}`")]
    InvalidCustomModel(String),

    #[error("Invalid config patch: {0}")]
    InvalidPatch(String),
}

/// The model under evaluation.
#[derive(Clone)]
pub enum ModelSpec {
    /// Model identifier, e.g. a hub id or a served model name.
    Id(String),
    /// In-process model object. Kept by reference across clones and merges.
    Custom(Arc<dyn CustomModel>),
}

impl ModelSpec {
    pub fn id(&self) -> &str {
        match self {
            ModelSpec::Id(id) => id,
            ModelSpec::Custom(model) => model.model_id(),
        }
    }

    pub fn custom(model: impl CustomModel + 'static) -> Self {
        ModelSpec::Custom(Arc::new(model))
    }
}

impl From<&str> for ModelSpec {
    fn from(id: &str) -> Self {
        ModelSpec::Id(id.to_string())
    }
}

impl From<String> for ModelSpec {
    fn from(id: String) -> Self {
        ModelSpec::Id(id)
    }
}

impl fmt::Debug for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSpec::Id(id) => f.debug_tuple("Id").field(id).finish(),
            ModelSpec::Custom(model) => f.debug_tuple("Custom").field(&model.model_id()).finish(),
        }
    }
}

impl PartialEq for ModelSpec {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ModelSpec::Id(a), ModelSpec::Id(b)) => a == b,
            (ModelSpec::Custom(a), ModelSpec::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Serialize for ModelSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}

impl<'de> Deserialize<'de> for ModelSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(ModelSpec::Id)
    }
}

/// Model loading arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelArgs {
    pub revision: String,
    pub precision: String,
    pub device_map: String,
    /// Base URL of an OpenAI-compatible endpoint serving the model
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

impl Default for ModelArgs {
    fn default() -> Self {
        Self {
            revision: "master".to_string(),
            precision: "auto".to_string(),
            device_map: "auto".to_string(),
            api_url: None,
            api_key: None,
        }
    }
}

/// Decoding parameters forwarded to the model adapter.
///
/// Keys not listed here are kept in `extra` and passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_length: u32,
    pub max_new_tokens: u32,
    pub do_sample: bool,
    pub top_k: u32,
    pub top_p: f64,
    pub temperature: f64,
    pub num_return_sequences: u32,
    /// Sampling seed; the task seed is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_length: 2048,
            max_new_tokens: 512,
            do_sample: false,
            top_k: 50,
            top_p: 1.0,
            temperature: 1.0,
            num_return_sequences: 1,
            seed: None,
            extra: BTreeMap::new(),
        }
    }
}

/// Per-benchmark overrides of registry defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetArgs {
    pub few_shot_num: Option<usize>,
    pub few_shot_random: Option<bool>,
    pub prompt_template: Option<String>,
    pub local_path: Option<PathBuf>,
    pub subset_list: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalType {
    #[default]
    Checkpoint,
    Custom,
}

/// Which engine executes the evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvalBackend {
    #[default]
    Native,
    OpenCompass,
    VLMEvalKit,
    RAGEval,
    ThirdParty,
}

impl EvalBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvalBackend::Native => "Native",
            EvalBackend::OpenCompass => "OpenCompass",
            EvalBackend::VLMEvalKit => "VLMEvalKit",
            EvalBackend::RAGEval => "RAGEval",
            EvalBackend::ThirdParty => "ThirdParty",
        }
    }
}

impl fmt::Display for EvalBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Full description of one evaluation task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskConfig {
    pub model: Option<ModelSpec>,
    pub model_args: ModelArgs,
    pub generation_config: GenerationConfig,
    pub chat_template: Option<String>,
    pub datasets: Option<Vec<String>>,
    pub dataset_args: BTreeMap<String, DatasetArgs>,
    pub dataset_dir: PathBuf,
    pub eval_type: EvalType,
    pub dry_run: bool,
    pub eval_backend: EvalBackend,
    /// Backend-specific settings for non-native backends
    pub eval_config: Option<Value>,
    pub limit: Option<usize>,
    /// Existing work directory to resume from
    pub use_cache: Option<PathBuf>,
    pub work_dir: PathBuf,
    pub debug: bool,
    pub seed: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            model: None,
            model_args: ModelArgs::default(),
            generation_config: GenerationConfig::default(),
            chat_template: None,
            datasets: None,
            dataset_args: BTreeMap::new(),
            dataset_dir: PathBuf::from(DEFAULT_DATASET_DIR),
            eval_type: EvalType::default(),
            dry_run: false,
            eval_backend: EvalBackend::default(),
            eval_config: None,
            limit: None,
            use_cache: None,
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            debug: false,
            seed: DEFAULT_SEED,
        }
    }
}

impl TaskConfig {
    pub fn new(model: impl Into<ModelSpec>, datasets: &[&str]) -> Self {
        Self {
            model: Some(model.into()),
            datasets: Some(datasets.iter().map(|d| d.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_dataset_args(mut self, dataset: &str, args: DatasetArgs) -> Self {
        self.dataset_args.insert(dataset.to_string(), args);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Build from a JSON object. Unknown keys are rejected.
    pub fn from_dict(value: Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from a `.yaml`, `.yml` or `.json` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(path)?,
            Some("json") => Self::from_json(path)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };
        tracing::info!("Loaded task configuration from {}", path.display());
        Ok(config)
    }

    /// JSON object form. A custom model appears as its model id.
    pub fn to_dict(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Merge a JSON object into this config.
    ///
    /// Keys present in `patch` replace current values, absent keys are kept.
    /// An in-process model survives unless the patch sets `model`.
    pub fn update(&mut self, patch: Value) -> Result<(), ConfigError> {
        let Value::Object(patch) = patch else {
            return Err(ConfigError::InvalidPatch(format!(
                "expected an object, got {}",
                patch
            )));
        };
        let Value::Object(mut merged) = self.to_dict() else {
            return Err(ConfigError::InvalidPatch("config is not an object".to_string()));
        };

        let keep_model = if patch.contains_key("model") {
            None
        } else {
            self.model.clone()
        };

        for (key, value) in patch {
            merged.insert(key, value);
        }

        let mut updated = Self::from_dict(Value::Object(merged))?;
        if keep_model.is_some() {
            updated.model = keep_model;
        }
        *self = updated;
        Ok(())
    }

    /// First `bits` hex characters of the MD5 digest of the printed config.
    pub fn hash_tag(&self, bits: usize) -> String {
        let digest = Md5::digest(self.to_string().as_bytes());
        let mut tag = hex::encode(digest);
        tag.truncate(bits);
        tag
    }

    /// Check the fields a native run cannot do without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (&self.model, &self.datasets) {
            (Some(_), Some(datasets)) if !datasets.is_empty() => Ok(()),
            _ => Err(ConfigError::MissingModelOrDatasets),
        }
    }

    /// Write the config as YAML, creating parent directories.
    pub fn dump_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content =
            serde_yaml::to_string(&self.to_dict()).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Names of every registered benchmark, sorted.
    pub fn list() -> Vec<String> {
        benchmarks::list()
    }

    /// Register `name` as a copy of benchmark `base` reading from `dataset_dir`.
    ///
    /// Returns false (and leaves the registry unchanged) if `base` is unknown.
    pub fn registry(
        name: &str,
        base: &str,
        dataset_dir: impl Into<PathBuf>,
        subset_list: Option<Vec<String>>,
    ) -> bool {
        benchmarks::derive(name, base, dataset_dir, subset_list)
    }

    /// One custom-model task per known benchmark name. Unknown names are skipped.
    pub fn load(custom_model: Arc<dyn CustomModel>, tasks: &[&str]) -> Vec<TaskConfig> {
        let known = benchmarks::list();
        tasks
            .iter()
            .filter_map(|task| {
                if !known.iter().any(|name| name == task) {
                    tracing::error!("Benchmark `{}` is not registered, skipping", task);
                    return None;
                }
                Some(TaskConfig {
                    model: Some(ModelSpec::Custom(custom_model.clone())),
                    datasets: Some(vec![task.to_string()]),
                    eval_type: EvalType::Custom,
                    ..Default::default()
                })
            })
            .collect()
    }
}

impl fmt::Display for TaskConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::to_string_pretty(&self.to_dict()).map_err(|_| fmt::Error)?;
        write!(f, "{}", rendered)
    }
}
