//! Scoring functions and metric aggregation

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Number of decimals kept in every reported score.
pub const SCORE_PRECISION: i32 = 4;

/// A reported score: a single value or one value per metric name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Score {
    Value(f64),
    Map(IndexMap<String, f64>),
}

impl Score {
    /// Primary value: the value itself, or the first metric of a map.
    pub fn primary(&self) -> f64 {
        match self {
            Score::Value(v) => *v,
            Score::Map(m) => m.values().next().copied().unwrap_or(0.0),
        }
    }

    /// Look up a metric by name (a plain value answers to any name).
    pub fn get(&self, metric: &str) -> Option<f64> {
        match self {
            Score::Value(v) => Some(*v),
            Score::Map(m) => m.get(metric).copied(),
        }
    }
}

impl From<f64> for Score {
    fn from(value: f64) -> Self {
        Score::Value(value)
    }
}

impl From<IndexMap<String, f64>> for Score {
    fn from(map: IndexMap<String, f64>) -> Self {
        Score::Map(map)
    }
}

/// Exact string match after trimming surrounding whitespace.
pub fn exact_match(gold: &str, pred: &str) -> f64 {
    if gold.trim() == pred.trim() {
        1.0
    } else {
        0.0
    }
}

/// Round to [`SCORE_PRECISION`] decimals, halves away from zero.
pub fn normalize_value(value: f64) -> f64 {
    let factor = 10f64.powi(SCORE_PRECISION);
    (value * factor).round() / factor
}

/// Round a score (or each entry of a score map) to the reporting precision.
pub fn normalize_score(score: Score) -> Score {
    match score {
        Score::Value(v) => Score::Value(normalize_value(v)),
        Score::Map(m) => Score::Map(m.into_iter().map(|(k, v)| (k, normalize_value(v))).collect()),
    }
}

/// Aggregation applied to the per-sample scores of one subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Mean over every scored sample.
    AverageAccuracy,
    /// Fraction of correct samples per example, averaged over examples.
    #[serde(rename = "Pass@1")]
    Pass1,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::AverageAccuracy => "AverageAccuracy",
            Metric::Pass1 => "Pass@1",
        }
    }

    /// Aggregate `samples`, one inner vector of sample scores per example.
    ///
    /// An example with no samples (e.g. a failed generation) counts as 0.
    pub fn compute(&self, samples: &[Vec<f64>]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        match self {
            Metric::AverageAccuracy => {
                let (sum, count) = samples.iter().fold((0.0, 0usize), |(sum, count), s| {
                    if s.is_empty() {
                        (sum, count + 1)
                    } else {
                        (sum + s.iter().sum::<f64>(), count + s.len())
                    }
                });
                sum / count as f64
            }
            Metric::Pass1 => {
                let total: f64 = samples
                    .iter()
                    .map(|s| {
                        if s.is_empty() {
                            0.0
                        } else {
                            s.iter().filter(|v| **v >= 1.0).count() as f64 / s.len() as f64
                        }
                    })
                    .sum();
                total / samples.len() as f64
            }
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compute every metric in `metrics` over `samples`.
///
/// A single metric yields [`Score::Value`], several yield [`Score::Map`].
pub fn compute_score(metrics: &[Metric], samples: &[Vec<f64>]) -> Score {
    match metrics {
        [] => Score::Value(Metric::AverageAccuracy.compute(samples)),
        [single] => Score::Value(single.compute(samples)),
        many => Score::Map(
            many.iter()
                .map(|m| (m.as_str().to_string(), m.compute(samples)))
                .collect(),
        ),
    }
}

/// Example-count weighted mean of subset scores.
pub fn weighted_average(parts: &[(f64, usize)]) -> f64 {
    let total: usize = parts.iter().map(|(_, n)| n).sum();
    if total == 0 {
        return 0.0;
    }
    parts.iter().map(|(s, n)| s * *n as f64).sum::<f64>() / total as f64
}

/// Weighted mean of subset scores, keeping the score's shape.
pub fn weighted_score(parts: &[(&Score, usize)]) -> Score {
    let Some((first, _)) = parts.first() else {
        return Score::Value(0.0);
    };

    match first {
        Score::Value(_) => {
            let values: Vec<(f64, usize)> = parts.iter().map(|(s, n)| (s.primary(), *n)).collect();
            Score::Value(weighted_average(&values))
        }
        Score::Map(keys) => Score::Map(
            keys.keys()
                .map(|key| {
                    let values: Vec<(f64, usize)> = parts
                        .iter()
                        .map(|(s, n)| (s.get(key).unwrap_or(0.0), *n))
                        .collect();
                    (key.clone(), weighted_average(&values))
                })
                .collect(),
        ),
    }
}
