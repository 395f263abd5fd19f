//! Benchmark registry
//!
//! Maps benchmark names to [`Benchmark`] entries. A process-wide registry is
//! initialised with the built-in benchmarks on first use; re-registering a
//! name replaces the previous entry.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{register_builtin_benchmarks, AdapterSettings, DataAdapter};
use crate::analysis::Metric;
use crate::config::DatasetArgs;
use crate::models::{chat_model_factory, ModelAdapter, ModelAdapterFactory, ModelResult, ModelSettings};

/// Builds the data adapter for a benchmark.
pub type DataAdapterFactory = Arc<dyn Fn(AdapterSettings) -> Box<dyn DataAdapter> + Send + Sync>;

/// Registry entry describing one benchmark.
#[derive(Clone)]
pub struct Benchmark {
    pub name: String,
    pub dataset_id: String,
    pub subset_list: Vec<String>,
    pub metric_list: Vec<Metric>,
    pub data_adapter: DataAdapterFactory,
    pub model_adapter: ModelAdapterFactory,
    pub few_shot_num: usize,
    pub train_split: Option<String>,
    pub eval_split: String,
    pub prompt_template: String,
    /// Local mirror overriding `<dataset_dir>/<dataset_id>`
    pub local_path: Option<PathBuf>,
    /// Data is never fetched for this benchmark; `local_path` must be given
    pub requires_local_path: bool,
}

impl Benchmark {
    pub fn new<F>(name: impl Into<String>, dataset_id: impl Into<String>, data_adapter: F) -> Self
    where
        F: Fn(AdapterSettings) -> Box<dyn DataAdapter> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            dataset_id: dataset_id.into(),
            subset_list: vec!["default".to_string()],
            metric_list: vec![Metric::AverageAccuracy],
            data_adapter: Arc::new(data_adapter),
            model_adapter: chat_model_factory(),
            few_shot_num: 0,
            train_split: None,
            eval_split: "test".to_string(),
            prompt_template: String::new(),
            local_path: None,
            requires_local_path: false,
        }
    }

    pub fn with_subsets(mut self, subsets: &[&str]) -> Self {
        self.subset_list = subsets.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_metrics(mut self, metrics: &[Metric]) -> Self {
        self.metric_list = metrics.to_vec();
        self
    }

    pub fn with_few_shot(mut self, few_shot_num: usize) -> Self {
        self.few_shot_num = few_shot_num;
        self
    }

    pub fn with_splits(mut self, train: Option<&str>, eval: &str) -> Self {
        self.train_split = train.map(str::to_string);
        self.eval_split = eval.to_string();
        self
    }

    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = template.into();
        self
    }

    pub fn with_model_adapter(mut self, factory: ModelAdapterFactory) -> Self {
        self.model_adapter = factory;
        self
    }

    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    pub fn requiring_local_path(mut self) -> Self {
        self.requires_local_path = true;
        self
    }

    /// Entry defaults with per-run overrides applied.
    pub fn adapter_settings(&self, args: &DatasetArgs) -> AdapterSettings {
        AdapterSettings {
            subset_list: args
                .subset_list
                .clone()
                .unwrap_or_else(|| self.subset_list.clone()),
            metric_list: self.metric_list.clone(),
            few_shot_num: args.few_shot_num.unwrap_or(self.few_shot_num),
            few_shot_random: args.few_shot_random.unwrap_or(true),
            train_split: self.train_split.clone(),
            eval_split: self.eval_split.clone(),
            prompt_template: args
                .prompt_template
                .clone()
                .unwrap_or_else(|| self.prompt_template.clone()),
        }
    }

    pub fn build_data_adapter(&self, args: &DatasetArgs) -> Box<dyn DataAdapter> {
        (self.data_adapter)(self.adapter_settings(args))
    }

    pub fn build_model_adapter(&self, settings: ModelSettings) -> ModelResult<Arc<dyn ModelAdapter>> {
        (self.model_adapter)(settings)
    }
}

impl fmt::Debug for Benchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Benchmark")
            .field("name", &self.name)
            .field("dataset_id", &self.dataset_id)
            .field("subset_list", &self.subset_list)
            .field("metric_list", &self.metric_list)
            .field("few_shot_num", &self.few_shot_num)
            .field("train_split", &self.train_split)
            .field("eval_split", &self.eval_split)
            .field("local_path", &self.local_path)
            .field("requires_local_path", &self.requires_local_path)
            .finish_non_exhaustive()
    }
}

/// Name-keyed collection of benchmarks.
#[derive(Clone, Default)]
pub struct BenchmarkRegistry {
    entries: BTreeMap<String, Benchmark>,
}

impl BenchmarkRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in benchmarks.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_builtin_benchmarks(&mut registry);
        registry
    }

    /// Store `benchmark` under its name, returning any entry it replaced.
    pub fn register(&mut self, benchmark: Benchmark) -> Option<Benchmark> {
        let previous = self.entries.insert(benchmark.name.clone(), benchmark);
        if let Some(old) = &previous {
            tracing::debug!("Benchmark {} re-registered", old.name);
        }
        previous
    }

    /// Copy `base` under `name`, reading data from `dataset_dir`.
    ///
    /// An unknown `base` is logged and leaves the registry untouched.
    pub fn derive(
        &mut self,
        name: &str,
        base: &str,
        dataset_dir: impl Into<PathBuf>,
        subset_list: Option<Vec<String>>,
    ) -> bool {
        let Some(mut entry) = self.entries.get(base).cloned() else {
            tracing::error!(
                "Cannot derive {} from unknown benchmark {}; available: {}",
                name,
                base,
                self.list().join(", ")
            );
            return false;
        };

        entry.name = name.to_string();
        entry.local_path = Some(dataset_dir.into());
        if let Some(subsets) = subset_list {
            entry.subset_list = subsets;
        }
        self.entries.insert(name.to_string(), entry);
        tracing::info!("Registered benchmark {} derived from {}", name, base);
        true
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn resolve(&self, name: &str) -> Option<Benchmark> {
        self.entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn global() -> &'static RwLock<BenchmarkRegistry> {
    static REGISTRY: OnceLock<RwLock<BenchmarkRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(BenchmarkRegistry::with_builtins()))
}

fn read() -> RwLockReadGuard<'static, BenchmarkRegistry> {
    global().read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write() -> RwLockWriteGuard<'static, BenchmarkRegistry> {
    global().write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Register a benchmark in the process-wide registry.
pub fn register(benchmark: Benchmark) {
    write().register(benchmark);
}

/// See [`BenchmarkRegistry::derive`].
pub fn derive(
    name: &str,
    base: &str,
    dataset_dir: impl Into<PathBuf>,
    subset_list: Option<Vec<String>>,
) -> bool {
    write().derive(name, base, dataset_dir, subset_list)
}

pub fn list() -> Vec<String> {
    read().list()
}

pub fn resolve(name: &str) -> Option<Benchmark> {
    read().resolve(name)
}

/// Copy of the process-wide registry.
pub fn snapshot() -> BenchmarkRegistry {
    read().clone()
}
