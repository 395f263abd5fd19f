//! Run controller: turns task inputs into evaluation results

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use super::evaluator::{EvalOptions, Evaluator, NoOpProgress, ProgressCallback};
use super::outputs::OutputsStructure;
use super::RunError;
use crate::benchmarks::{self, Benchmark, BenchmarkRegistry};
use crate::config::{
    ConfigError, DatasetArgs, EvalBackend, EvalType, ModelSpec, TaskConfig, DEFAULT_WORK_DIR,
};
use crate::datasets::{DatasetSource, LocalDatasetSource};
use crate::models::{CustomModelAdapter, DummyChatModel, ModelAdapter, ModelSettings};
use crate::reporting::EvalResults;

/// Anything a run can be started from.
#[derive(Debug, Clone)]
pub enum TaskInput {
    Config(TaskConfig),
    Dict(Value),
    /// A `.yaml`, `.yml` or `.json` file
    Path(PathBuf),
    /// Tasks run one after another
    Batch(Vec<TaskInput>),
}

impl From<TaskConfig> for TaskInput {
    fn from(config: TaskConfig) -> Self {
        TaskInput::Config(config)
    }
}

impl From<Value> for TaskInput {
    fn from(value: Value) -> Self {
        TaskInput::Dict(value)
    }
}

impl From<PathBuf> for TaskInput {
    fn from(path: PathBuf) -> Self {
        TaskInput::Path(path)
    }
}

impl From<&Path> for TaskInput {
    fn from(path: &Path) -> Self {
        TaskInput::Path(path.to_path_buf())
    }
}

impl<T: Into<TaskInput>> From<Vec<T>> for TaskInput {
    fn from(items: Vec<T>) -> Self {
        TaskInput::Batch(items.into_iter().map(Into::into).collect())
    }
}

impl TaskInput {
    /// Resolve a single (non-batch) input to a config.
    pub fn into_config(self) -> Result<TaskConfig, ConfigError> {
        match self {
            TaskInput::Config(config) => Ok(config),
            TaskInput::Dict(value) => TaskConfig::from_dict(value),
            TaskInput::Path(path) => TaskConfig::from_file(path),
            TaskInput::Batch(_) => Err(ConfigError::Parse(
                "nested batches are not supported".to_string(),
            )),
        }
    }
}

/// Result of [`Runner::run_task`]: one result map, or one per batch entry.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutput {
    Single(EvalResults),
    Batch(Vec<EvalResults>),
}

impl RunOutput {
    pub fn into_single(self) -> Option<EvalResults> {
        match self {
            RunOutput::Single(results) => Some(results),
            RunOutput::Batch(_) => None,
        }
    }

    /// Every result map, in order.
    pub fn into_vec(self) -> Vec<EvalResults> {
        match self {
            RunOutput::Single(results) => vec![results],
            RunOutput::Batch(all) => all,
        }
    }
}

/// Executes a task on an evaluation engine other than the native one.
#[async_trait]
pub trait BackendRunner: Send + Sync {
    async fn run(&self, config: &TaskConfig) -> Result<(), String>;
}

/// Everything resolved for one dataset before any inference starts.
struct DatasetPlan {
    name: String,
    benchmark: Benchmark,
    args: DatasetArgs,
    root: PathBuf,
}

/// Drives task execution.
pub struct Runner {
    registry: BenchmarkRegistry,
    source: Arc<dyn DatasetSource>,
    backends: HashMap<EvalBackend, Arc<dyn BackendRunner>>,
    progress: Arc<dyn ProgressCallback>,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Runner over the process-wide benchmark registry and local dataset mirrors.
    pub fn new() -> Self {
        Self {
            registry: benchmarks::snapshot(),
            source: Arc::new(LocalDatasetSource::new()),
            backends: HashMap::new(),
            progress: Arc::new(NoOpProgress),
        }
    }

    pub fn with_registry(mut self, registry: BenchmarkRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_source(mut self, source: Arc<dyn DatasetSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_backend(mut self, backend: EvalBackend, runner: Arc<dyn BackendRunner>) -> Self {
        self.backends.insert(backend, runner);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Run a task or a batch of tasks.
    ///
    /// In a batch, configuration errors abort the whole batch; any other
    /// failure is logged and leaves an empty result in that task's slot.
    pub async fn run_task(&self, input: impl Into<TaskInput>) -> Result<RunOutput, RunError> {
        let run_time = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();

        match input.into() {
            TaskInput::Batch(items) => {
                let mut all = Vec::with_capacity(items.len());
                for item in items {
                    let config = item.into_config()?;
                    match self.run_single_task(config, &run_time).await {
                        Ok(results) => all.push(results),
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            tracing::error!("Task failed: {}", e);
                            all.push(IndexMap::new());
                        }
                    }
                }
                Ok(RunOutput::Batch(all))
            }
            single => {
                let config = single.into_config()?;
                self.run_single_task(config, &run_time)
                    .await
                    .map(RunOutput::Single)
            }
        }
    }

    /// Run one task. `run_time` names the sub-directory of the default work dir.
    pub async fn run_single_task(
        &self,
        mut config: TaskConfig,
        run_time: &str,
    ) -> Result<EvalResults, RunError> {
        if let Some(cache) = &config.use_cache {
            tracing::info!("Resuming from {}", cache.display());
            config.work_dir = cache.clone();
        } else if config.work_dir == Path::new(DEFAULT_WORK_DIR) {
            config.work_dir = config.work_dir.join(run_time);
        }

        tracing::info!("Task config:\n{}", config);

        if config.eval_backend != EvalBackend::Native {
            return self.run_backend(&config).await;
        }

        config.validate()?;
        let model_adapter = self.build_model_adapter(&config)?;
        let plans = self.plan(&config)?;

        let outputs = OutputsStructure::new(&config.work_dir);
        let config_path = outputs.config_path(&config.hash_tag(6));
        if let Err(e) = config.dump_yaml(&config_path) {
            tracing::warn!("Failed to dump config to {}: {}", config_path.display(), e);
        }

        let mut results = IndexMap::new();
        for plan in plans {
            let model_adapter = match &model_adapter {
                Some(adapter) => adapter.clone(),
                None => plan.benchmark.build_model_adapter(ModelSettings {
                    model_id: config.model.as_ref().map(|m| m.id().to_string()).unwrap_or_default(),
                    args: config.model_args.clone(),
                    chat_template: config.chat_template.clone(),
                })?,
            };

            let evaluator = Evaluator::new(
                plan.name.clone(),
                plan.benchmark.build_data_adapter(&plan.args),
                model_adapter,
                self.source.clone(),
                outputs.clone(),
            )
            .with_dataset_root(plan.root)
            .with_options(EvalOptions::from_config(&config))
            .with_progress(self.progress.clone());

            let report = evaluator.eval().await;
            results.insert(plan.name, report);
        }

        Ok(results)
    }

    async fn run_backend(&self, config: &TaskConfig) -> Result<EvalResults, RunError> {
        if config.eval_backend == EvalBackend::ThirdParty {
            return Err(RunError::BackendNotImplemented(config.eval_backend));
        }
        if config.eval_config.is_none() {
            tracing::warn!("No eval_config given for backend {}", config.eval_backend);
        }

        let runner = self
            .backends
            .get(&config.eval_backend)
            .ok_or(RunError::BackendUnavailable(config.eval_backend))?;
        tracing::info!("Handing task to the {} backend", config.eval_backend);
        runner.run(config).await.map_err(RunError::Backend)?;
        Ok(IndexMap::new())
    }

    /// Adapter shared by every dataset, or `None` to use each benchmark's factory.
    fn build_model_adapter(
        &self,
        config: &TaskConfig,
    ) -> Result<Option<Arc<dyn ModelAdapter>>, ConfigError> {
        if config.dry_run {
            return Ok(Some(Arc::new(DummyChatModel::new())));
        }
        match (&config.model, config.eval_type) {
            (Some(ModelSpec::Custom(model)), _) => {
                Ok(Some(Arc::new(CustomModelAdapter::new(model.clone()))))
            }
            (Some(ModelSpec::Id(id)), EvalType::Custom) => {
                Err(ConfigError::InvalidCustomModel(id.clone()))
            }
            _ => Ok(None),
        }
    }

    /// Resolve every dataset and check its data location up front.
    fn plan(&self, config: &TaskConfig) -> Result<Vec<DatasetPlan>, ConfigError> {
        let datasets = config.datasets.as_deref().unwrap_or_default();
        datasets
            .iter()
            .map(|name| {
                let benchmark = self.registry.resolve(name).ok_or_else(|| {
                    tracing::error!("Benchmark {} is not registered", name);
                    ConfigError::UnknownBenchmark {
                        name: name.clone(),
                        available: self.registry.list().join(", "),
                    }
                })?;
                let args = config.dataset_args.get(name).cloned().unwrap_or_default();

                let local_path = args.local_path.clone().or_else(|| benchmark.local_path.clone());
                let root = match local_path {
                    Some(path) if !path.exists() => {
                        return Err(ConfigError::LocalPathNotFound {
                            dataset: name.clone(),
                            path,
                        })
                    }
                    Some(path) => path,
                    None if benchmark.requires_local_path => {
                        return Err(ConfigError::MissingLocalPath(name.clone()))
                    }
                    None => config.dataset_dir.join(&benchmark.dataset_id),
                };

                Ok(DatasetPlan {
                    name: name.clone(),
                    benchmark,
                    args,
                    root,
                })
            })
            .collect()
    }
}

/// Run a task with a default [`Runner`].
pub async fn run_task(input: impl Into<TaskInput>) -> Result<RunOutput, RunError> {
    Runner::new().run_task(input).await
}
