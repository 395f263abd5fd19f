//! Per-dataset evaluation pipeline
//!
//! For every subset: load records, build prompts, generate, parse, score and
//! persist. Subset results are then merged into a [`DatasetReport`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::outputs::{write_json_atomic, OutputsStructure};
use crate::analysis::{compute_score, normalize_score};
use crate::benchmarks::{DataAdapter, PromptBundle};
use crate::config::{EvalType, GenerationConfig, TaskConfig};
use crate::datasets::{DatasetSource, Record};
use crate::models::ModelAdapter;
use crate::reporting::{DatasetReport, ReviewRecord, SampleReview, SubsetReport};

/// Stages of an evaluation, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalPhase {
    Init,
    LoadData,
    BuildPrompts,
    Infer,
    Parse,
    Score,
    Aggregate,
    Persist,
    Done,
}

impl fmt::Display for EvalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvalPhase::Init => "init",
            EvalPhase::LoadData => "load data",
            EvalPhase::BuildPrompts => "build prompts",
            EvalPhase::Infer => "infer",
            EvalPhase::Parse => "parse",
            EvalPhase::Score => "score",
            EvalPhase::Aggregate => "aggregate",
            EvalPhase::Persist => "persist",
            EvalPhase::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// Run-level settings the evaluator needs from the task config.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalOptions {
    pub generation_config: GenerationConfig,
    pub eval_type: EvalType,
    pub limit: Option<usize>,
    /// Reuse persisted subset results
    pub use_cache: bool,
    pub seed: u64,
    pub debug: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self::from_config(&TaskConfig::default())
    }
}

impl EvalOptions {
    pub fn from_config(config: &TaskConfig) -> Self {
        let mut generation_config = config.generation_config.clone();
        generation_config.seed.get_or_insert(config.seed);
        Self {
            generation_config,
            eval_type: config.eval_type,
            limit: config.limit,
            use_cache: config.use_cache.is_some(),
            seed: config.seed,
            debug: config.debug,
        }
    }
}

/// Progress callback for evaluation
pub trait ProgressCallback: Send + Sync {
    fn on_subset_start(&self, dataset: &str, subset: &str, total: usize);
    fn on_example_complete(&self, dataset: &str, subset: &str, success: bool);
    fn on_subset_complete(&self, dataset: &str, subset: &str, report: &SubsetReport);
}

/// Default no-op progress callback
pub struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_subset_start(&self, _dataset: &str, _subset: &str, _total: usize) {}
    fn on_example_complete(&self, _dataset: &str, _subset: &str, _success: bool) {}
    fn on_subset_complete(&self, _dataset: &str, _subset: &str, _report: &SubsetReport) {}
}

/// Console progress callback
pub struct ConsoleProgress;

impl ProgressCallback for ConsoleProgress {
    fn on_subset_start(&self, dataset: &str, subset: &str, total: usize) {
        println!("  Evaluating {}/{} ({} examples)...", dataset, subset, total);
    }

    fn on_example_complete(&self, _dataset: &str, _subset: &str, _success: bool) {}

    fn on_subset_complete(&self, dataset: &str, subset: &str, report: &SubsetReport) {
        println!(
            "  Done {}/{}: score {:.4} over {} examples",
            dataset,
            subset,
            report.score.primary(),
            report.num
        );
    }
}

/// Seed for one subset, so each subset's draws are independent of the others.
pub fn subset_seed(seed: u64, subset: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    subset
        .bytes()
        .fold(FNV_OFFSET ^ seed, |hash, byte| (hash ^ byte as u64).wrapping_mul(FNV_PRIME))
}

struct Example {
    record: Record,
    prompt: Option<PromptBundle>,
    outputs: Vec<String>,
    error: Option<String>,
}

/// Evaluates one dataset against one model.
pub struct Evaluator {
    dataset_name: String,
    dataset_root: PathBuf,
    data_adapter: Box<dyn DataAdapter>,
    model_adapter: Arc<dyn ModelAdapter>,
    source: Arc<dyn DatasetSource>,
    outputs: OutputsStructure,
    options: EvalOptions,
    progress: Arc<dyn ProgressCallback>,
}

impl Evaluator {
    pub fn new(
        dataset_name: impl Into<String>,
        data_adapter: Box<dyn DataAdapter>,
        model_adapter: Arc<dyn ModelAdapter>,
        source: Arc<dyn DatasetSource>,
        outputs: OutputsStructure,
    ) -> Self {
        let dataset_name = dataset_name.into();
        Self {
            dataset_root: PathBuf::from(&dataset_name),
            dataset_name,
            data_adapter,
            model_adapter,
            source,
            outputs,
            options: EvalOptions::default(),
            progress: Arc::new(NoOpProgress),
        }
    }

    /// Directory the dataset source resolves subsets under
    pub fn with_dataset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.dataset_root = root.into();
        self
    }

    pub fn with_options(mut self, options: EvalOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    fn enter(&self, phase: EvalPhase, subset: Option<&str>) {
        match subset {
            Some(subset) => tracing::info!("[{}/{}] {}", self.dataset_name, subset, phase),
            None => tracing::info!("[{}] {}", self.dataset_name, phase),
        }
    }

    /// Evaluate every configured subset and merge the results.
    pub async fn eval(&self) -> DatasetReport {
        let model_id = self.model_adapter.model_id().to_string();
        self.enter(EvalPhase::Init, None);
        tracing::info!(
            "Evaluating {} with {} (revision {})",
            self.dataset_name,
            model_id,
            self.model_adapter.revision()
        );

        let mut subsets = Vec::new();
        for subset in &self.data_adapter.settings().subset_list {
            if self.options.use_cache {
                if let Some(cached) = self.outputs.cached_subset(&model_id, &self.dataset_name, subset) {
                    tracing::info!("[{}/{}] reusing cached results", self.dataset_name, subset);
                    subsets.push(cached);
                    continue;
                }
            }
            if let Some(report) = self.eval_subset(subset, &model_id).await {
                subsets.push(report);
            }
        }

        self.enter(EvalPhase::Aggregate, None);
        let report = DatasetReport::from_subsets(
            &self.dataset_name,
            &model_id,
            &self.data_adapter.settings().metric_list,
            &subsets,
        );

        self.enter(EvalPhase::Persist, None);
        let path = self.outputs.report_path(&model_id, &self.dataset_name);
        if let Err(e) = write_json_atomic(&path, &report) {
            tracing::warn!("Failed to write report {}: {}", path.display(), e);
        }

        self.enter(EvalPhase::Done, None);
        report
    }

    fn few_shot_pool(&self, subset: &str) -> Vec<Record> {
        let settings = self.data_adapter.settings();
        let Some(split) = settings.train_split.as_deref() else {
            return Vec::new();
        };
        if settings.few_shot_num == 0 {
            return Vec::new();
        }
        match self.source.load(&self.dataset_root, subset, split) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(
                    "[{}/{}] no few-shot examples available: {}",
                    self.dataset_name,
                    subset,
                    e
                );
                Vec::new()
            }
        }
    }

    async fn eval_subset(&self, subset: &str, model_id: &str) -> Option<SubsetReport> {
        let settings = self.data_adapter.settings();

        self.enter(EvalPhase::LoadData, Some(subset));
        let mut records = match self.source.load(&self.dataset_root, subset, &settings.eval_split) {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("[{}/{}] failed to load data: {}", self.dataset_name, subset, e);
                return None;
            }
        };
        if let Some(limit) = self.options.limit {
            records.truncate(limit);
        }
        let train = self.few_shot_pool(subset);

        self.enter(EvalPhase::BuildPrompts, Some(subset));
        let mut rng = StdRng::seed_from_u64(subset_seed(self.options.seed, subset));
        let prompts = self.data_adapter.gen_prompts(subset, &train, &records, &mut rng);
        let mut examples: Vec<Example> = records
            .into_iter()
            .zip(prompts)
            .map(|(mut record, prompt)| match prompt {
                Ok(bundle) => {
                    record.extend(bundle.record_updates.clone());
                    Example {
                        record,
                        prompt: Some(bundle),
                        outputs: Vec::new(),
                        error: None,
                    }
                }
                Err(e) => Example {
                    record,
                    prompt: None,
                    outputs: Vec::new(),
                    error: Some(format!("prompt: {}", e)),
                },
            })
            .collect();

        self.enter(EvalPhase::Infer, Some(subset));
        self.progress.on_subset_start(&self.dataset_name, subset, examples.len());
        for example in &mut examples {
            if let Some(prompt) = &example.prompt {
                match self
                    .model_adapter
                    .generate(prompt, &self.options.generation_config)
                    .await
                {
                    Ok(outputs) => example.outputs = outputs,
                    Err(e) => example.error = Some(format!("generate: {}", e)),
                }
            }
            self.progress
                .on_example_complete(&self.dataset_name, subset, example.error.is_none());
        }

        self.enter(EvalPhase::Parse, Some(subset));
        let mut reviews: Vec<ReviewRecord> = examples
            .into_iter()
            .enumerate()
            .map(|(index, example)| self.review(index, example))
            .collect();

        self.enter(EvalPhase::Score, Some(subset));
        let scores: Vec<Vec<f64>> = reviews
            .iter_mut()
            .map(|review| {
                let sample_scores = self.score_review(review);
                if self.options.debug {
                    tracing::debug!(
                        "[{}/{}#{}] gold={:?} preds={:?} scores={:?} error={:?}",
                        self.dataset_name,
                        subset,
                        review.index,
                        review.gold,
                        review.samples.iter().map(|s| s.pred.as_str()).collect::<Vec<_>>(),
                        sample_scores,
                        review.error
                    );
                }
                sample_scores
            })
            .collect();
        let score = normalize_score(compute_score(&settings.metric_list, &scores));
        let report = SubsetReport {
            name: subset.to_string(),
            num: reviews.len(),
            score,
            reviews,
        };

        let path = self.outputs.subset_path(model_id, &self.dataset_name, subset);
        if let Err(e) = write_json_atomic(&path, &report) {
            tracing::warn!("Failed to write subset result {}: {}", path.display(), e);
        }
        self.progress
            .on_subset_complete(&self.dataset_name, subset, &report);
        Some(report)
    }

    /// Resolve the gold answer and parse every sample of one example.
    fn review(&self, index: usize, mut example: Example) -> ReviewRecord {
        let gold = if example.error.is_none() {
            match self.data_adapter.get_gold_answer(&example.record) {
                Ok(gold) => Some(gold),
                Err(e) => {
                    example.error = Some(format!("gold: {}", e));
                    None
                }
            }
        } else {
            None
        };

        let samples: Vec<SampleReview> = example
            .outputs
            .into_iter()
            .map(|raw| {
                let pred = self
                    .data_adapter
                    .parse_pred_result(&raw, &example.record, self.options.eval_type);
                SampleReview {
                    raw,
                    pred,
                    score: 0.0,
                }
            })
            .collect();

        let (prompt, system_prompt) = match example.prompt {
            Some(bundle) => (bundle.data, bundle.system_prompt),
            None => (Vec::new(), None),
        };

        ReviewRecord {
            index,
            prompt,
            system_prompt,
            gold,
            samples,
            error: example.error,
        }
    }

    /// Match each parsed sample against the gold answer. Failed examples
    /// score no samples, which the metrics count as 0.
    fn score_review(&self, review: &mut ReviewRecord) -> Vec<f64> {
        let Some(gold) = review.gold.as_deref() else {
            return Vec::new();
        };
        for sample in &mut review.samples {
            sample.score = self.data_adapter.match_score(gold, &sample.pred);
        }
        if review.error.is_some() {
            return Vec::new();
        }
        review.samples.iter().map(|s| s.score).collect()
    }
}
