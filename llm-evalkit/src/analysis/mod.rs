//! Answer extraction and scoring

pub mod metrics;
pub mod parser;

pub use metrics::{
    compute_score, exact_match, normalize_score, normalize_value, weighted_average,
    weighted_score, Metric, Score, SCORE_PRECISION,
};
pub use parser::ResponseParser;
