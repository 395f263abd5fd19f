//! Benchmarks: data adapters and the registry that names them
//!
//! Each benchmark pairs a dataset with a [`DataAdapter`] that knows how to
//! turn its rows into prompts, find the gold answer, and extract and score
//! a prediction.

pub mod arc;
pub mod gpqa;
pub mod gsm8k;
pub mod registry;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analysis::Metric;
use crate::config::EvalType;
pub use crate::datasets::Record;

pub use registry::{
    derive, list, register, resolve, snapshot, Benchmark, BenchmarkRegistry, DataAdapterFactory,
};

/// Labels used by four-option multiple-choice benchmarks.
pub const ABCD: [&str; 4] = ["A", "B", "C", "D"];

/// Error types for adapter operations
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Missing field `{0}`")]
    MissingField(String),

    #[error("Invalid field `{field}`: {reason}")]
    InvalidField { field: String, reason: String },
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Model input produced for one record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptBundle {
    /// Prompt turns, in order
    pub data: Vec<String>,
    #[serde(default)]
    pub multi_choices: Vec<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Values merged into the record before gold extraction
    #[serde(default, skip_serializing_if = "Record::is_empty")]
    pub record_updates: Record,
}

impl PromptBundle {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            data: vec![prompt.into()],
            ..Default::default()
        }
    }

    pub fn with_choices(mut self, choices: &[&str]) -> Self {
        self.multi_choices = choices.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Use `template` as the system prompt unless it is empty.
    pub fn with_system_prompt(mut self, template: &str) -> Self {
        self.system_prompt = (!template.is_empty()).then(|| template.to_string());
        self
    }
}

/// Resolved settings a data adapter is constructed with.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterSettings {
    pub subset_list: Vec<String>,
    pub metric_list: Vec<Metric>,
    pub few_shot_num: usize,
    pub few_shot_random: bool,
    pub train_split: Option<String>,
    pub eval_split: String,
    pub prompt_template: String,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            subset_list: vec!["default".to_string()],
            metric_list: vec![Metric::AverageAccuracy],
            few_shot_num: 0,
            few_shot_random: true,
            train_split: None,
            eval_split: "test".to_string(),
            prompt_template: String::new(),
        }
    }
}

/// Benchmark-specific prompt construction, gold extraction and scoring.
pub trait DataAdapter: Send + Sync {
    fn settings(&self) -> &AdapterSettings;

    /// Build the model input for `record`.
    ///
    /// Must be deterministic for the same record, few-shot sample and rng state.
    fn gen_prompt(
        &self,
        record: &Record,
        subset: &str,
        few_shot: &[Record],
        rng: &mut StdRng,
    ) -> AdapterResult<PromptBundle>;

    fn get_gold_answer(&self, record: &Record) -> AdapterResult<String>;

    /// Extract the answer from raw model output. Returns an empty string when
    /// nothing can be extracted.
    fn parse_pred_result(&self, result: &str, record: &Record, eval_type: EvalType) -> String;

    fn match_score(&self, gold: &str, pred: &str) -> f64;

    /// Draw the few-shot exemplars for a subset.
    ///
    /// Random draws are without replacement; otherwise the first records are
    /// taken. The count is clamped to the records available.
    fn sample_few_shot(&self, train: &[Record], rng: &mut StdRng) -> Vec<Record> {
        let settings = self.settings();
        draw_exemplars(train, settings.few_shot_num, settings.few_shot_random, rng)
    }

    /// Sample exemplars once, then build a prompt for every eval record.
    ///
    /// One spare exemplar is drawn so that a record never appears among its
    /// own exemplars when the pool and the eval split overlap.
    fn gen_prompts(
        &self,
        subset: &str,
        train: &[Record],
        eval: &[Record],
        rng: &mut StdRng,
    ) -> Vec<AdapterResult<PromptBundle>> {
        let settings = self.settings();
        let k = settings.few_shot_num;
        let spare = if k == 0 { 0 } else { k + 1 };
        let candidates = draw_exemplars(train, spare, settings.few_shot_random, rng);

        eval.iter()
            .map(|record| {
                let few_shot: Vec<Record> = candidates
                    .iter()
                    .filter(|candidate| *candidate != record)
                    .take(k)
                    .cloned()
                    .collect();
                self.gen_prompt(record, subset, &few_shot, rng)
            })
            .collect()
    }
}

fn draw_exemplars(train: &[Record], k: usize, random: bool, rng: &mut StdRng) -> Vec<Record> {
    let k = k.min(train.len());
    if k == 0 {
        return Vec::new();
    }
    if random {
        train.choose_multiple(rng, k).cloned().collect()
    } else {
        train[..k].to_vec()
    }
}

/// String value of `key`; numbers are rendered as text.
pub fn field_text(record: &Record, key: &str) -> AdapterResult<String> {
    match record.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(Value::Null) | None => Err(AdapterError::MissingField(key.to_string())),
        Some(other) => Err(AdapterError::InvalidField {
            field: key.to_string(),
            reason: format!("expected text, got {}", other),
        }),
    }
}

/// Register the built-in benchmarks in their documented order.
pub fn register_builtin_benchmarks(registry: &mut BenchmarkRegistry) {
    registry.register(gpqa::benchmark());
    registry.register(arc::benchmark());
    registry.register(gsm8k::benchmark());
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use serde_json::json;

    struct Echo {
        settings: AdapterSettings,
    }

    impl DataAdapter for Echo {
        fn settings(&self) -> &AdapterSettings {
            &self.settings
        }

        fn gen_prompt(
            &self,
            record: &Record,
            _subset: &str,
            few_shot: &[Record],
            _rng: &mut StdRng,
        ) -> AdapterResult<PromptBundle> {
            let shots: Vec<String> = few_shot
                .iter()
                .map(|r| field_text(r, "q"))
                .collect::<AdapterResult<_>>()?;
            Ok(PromptBundle::new(format!("{}|{}", shots.join(","), field_text(record, "q")?)))
        }

        fn get_gold_answer(&self, record: &Record) -> AdapterResult<String> {
            field_text(record, "a")
        }

        fn parse_pred_result(&self, result: &str, _record: &Record, _eval_type: EvalType) -> String {
            result.trim().to_string()
        }

        fn match_score(&self, gold: &str, pred: &str) -> f64 {
            crate::analysis::exact_match(gold, pred)
        }
    }

    fn train(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| crate::datasets::record(json!({"q": format!("t{}", i)})))
            .collect()
    }

    fn echo(few_shot_num: usize, few_shot_random: bool) -> Echo {
        Echo {
            settings: AdapterSettings {
                few_shot_num,
                few_shot_random,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_few_shot_sampling_is_reproducible() {
        let adapter = echo(3, true);
        let pool = train(20);
        let a = adapter.sample_few_shot(&pool, &mut StdRng::seed_from_u64(42));
        let b = adapter.sample_few_shot(&pool, &mut StdRng::seed_from_u64(42));
        assert_eq!(a.len(), 3);
        assert_eq!(a, b);
    }

    #[test]
    fn test_few_shot_without_replacement() {
        let adapter = echo(5, true);
        let pool = train(5);
        let mut picked: Vec<String> = adapter
            .sample_few_shot(&pool, &mut StdRng::seed_from_u64(7))
            .iter()
            .map(|r| field_text(r, "q").unwrap())
            .collect();
        picked.sort();
        picked.dedup();
        assert_eq!(picked.len(), 5);
    }

    #[test]
    fn test_few_shot_prefix_and_clamp() {
        let adapter = echo(10, false);
        let shots = adapter.sample_few_shot(&train(3), &mut StdRng::seed_from_u64(0));
        assert_eq!(shots, train(3));

        assert!(echo(0, true)
            .sample_few_shot(&train(3), &mut StdRng::seed_from_u64(0))
            .is_empty());
    }

    #[test]
    fn test_gen_prompts_reports_per_record_errors() {
        let adapter = echo(1, false);
        let eval = vec![
            crate::datasets::record(json!({"q": "x"})),
            crate::datasets::record(json!({"other": 1})),
        ];
        let prompts = adapter.gen_prompts("s", &train(2), &eval, &mut StdRng::seed_from_u64(0));
        assert_eq!(prompts[0].as_ref().unwrap().data, vec!["t0|x".to_string()]);
        assert!(matches!(prompts[1], Err(AdapterError::MissingField(_))));
    }

    #[test]
    fn test_record_never_among_its_own_exemplars() {
        let pool = train(4);
        for random in [true, false] {
            let adapter = echo(3, random);
            let prompts = adapter.gen_prompts("s", &pool, &pool, &mut StdRng::seed_from_u64(3));
            for (i, prompt) in prompts.iter().enumerate() {
                let text = &prompt.as_ref().unwrap().data[0];
                let (shots, question) = text.split_once('|').unwrap();
                assert_eq!(question, format!("t{}", i));
                assert_eq!(shots.split(',').count(), 3);
                assert!(!shots.split(',').any(|s| s == question), "{}", text);
            }
        }
    }

    #[test]
    fn test_field_text() {
        let record = crate::datasets::record(json!({"s": "a", "n": 3, "z": null, "l": [1]}));
        assert_eq!(field_text(&record, "s").unwrap(), "a");
        assert_eq!(field_text(&record, "n").unwrap(), "3");
        assert!(matches!(field_text(&record, "z"), Err(AdapterError::MissingField(_))));
        assert!(matches!(field_text(&record, "l"), Err(AdapterError::InvalidField { .. })));
    }

    #[test]
    fn test_empty_template_means_no_system_prompt() {
        assert_eq!(PromptBundle::new("q").with_system_prompt("").system_prompt, None);
        assert_eq!(
            PromptBundle::new("q").with_system_prompt("sys").system_prompt.as_deref(),
            Some("sys")
        );
    }
}
