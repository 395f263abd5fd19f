//! Evaluation reports

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::analysis::{normalize_score, weighted_score, Metric, Score};

/// Results of one run, keyed by dataset name in run order.
pub type EvalResults = IndexMap<String, DatasetReport>;

/// One generated sample and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleReview {
    pub raw: String,
    pub pred: String,
    pub score: f64,
}

/// What happened to one example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub index: usize,
    pub prompt: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub gold: Option<String>,
    pub samples: Vec<SampleReview>,
    /// Set when prompt building, generation or gold extraction failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Scored results for one subset, persisted as the resume checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetReport {
    pub name: String,
    pub num: usize,
    pub score: Score,
    #[serde(default)]
    pub reviews: Vec<ReviewRecord>,
}

impl SubsetReport {
    /// Load a previously persisted subset report.
    pub fn read_from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn summary(&self) -> SubsetScore {
        SubsetScore {
            name: self.name.clone(),
            num: self.num,
            score: self.score.clone(),
        }
    }
}

/// Subset line of a dataset report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetScore {
    pub name: String,
    pub num: usize,
    pub score: Score,
}

/// Dataset-level report merged from its subsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetReport {
    pub dataset_name: String,
    pub model_name: String,
    pub metric: String,
    pub score: Score,
    pub subsets: Vec<SubsetScore>,
}

impl DatasetReport {
    /// Merge subset reports; the dataset score is the example-weighted mean.
    pub fn from_subsets(
        dataset_name: impl Into<String>,
        model_name: impl Into<String>,
        metrics: &[Metric],
        subsets: &[SubsetReport],
    ) -> Self {
        let parts: Vec<(&Score, usize)> = subsets.iter().map(|s| (&s.score, s.num)).collect();
        Self {
            dataset_name: dataset_name.into(),
            model_name: model_name.into(),
            metric: metrics
                .iter()
                .map(Metric::as_str)
                .collect::<Vec<_>>()
                .join(","),
            score: normalize_score(weighted_score(&parts)),
            subsets: subsets.iter().map(SubsetReport::summary).collect(),
        }
    }

    pub fn num(&self) -> usize {
        self.subsets.iter().map(|s| s.num).sum()
    }
}

fn format_score(score: &Score) -> String {
    match score {
        Score::Value(v) => format!("{:.4}", v),
        Score::Map(m) => m
            .iter()
            .map(|(k, v)| format!("{}={:.4}", k, v))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// Generate a console report
pub fn print_console_report(results: &EvalResults) {
    println!("\n=== Evaluation Results ===\n");

    if results.is_empty() {
        println!("  (no datasets evaluated)");
    }

    for report in results.values() {
        println!(
            "{} | model: {} | {}: {} | examples: {}",
            report.dataset_name,
            report.model_name,
            report.metric,
            format_score(&report.score),
            report.num()
        );
        println!("{:-<50}", "");
        for subset in &report.subsets {
            println!("  {:<24} {:>10}  (n={})", subset.name, format_score(&subset.score), subset.num);
        }
        println!();
    }

    println!("{:=<50}", "");
}
