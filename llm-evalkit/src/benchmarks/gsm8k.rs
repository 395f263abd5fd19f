//! GSM8K grade-school math word problems
//!
//! The reference answer is a worked solution ending in `#### <number>`.
//! Predictions are scored on the final number the model produces.

use std::sync::OnceLock;

use rand::rngs::StdRng;
use regex::Regex;

use super::{field_text, AdapterError, AdapterResult, AdapterSettings, Benchmark, DataAdapter, PromptBundle, Record};
use crate::analysis::{exact_match, Metric};
use crate::config::EvalType;

const ANSWER_MARKER: &str = "####";
const COT_CUE: &str = "Let's think step by step";

pub fn benchmark() -> Benchmark {
    Benchmark::new("gsm8k", "modelscope/gsm8k", |settings| Box::new(Gsm8kAdapter::new(settings)))
        .with_subsets(&["main"])
        .with_metrics(&[Metric::AverageAccuracy])
        .with_few_shot(4)
        .with_splits(Some("train"), "test")
}

pub struct Gsm8kAdapter {
    settings: AdapterSettings,
}

impl Gsm8kAdapter {
    pub fn new(settings: AdapterSettings) -> Self {
        Self { settings }
    }

    fn exemplar(record: &Record) -> AdapterResult<String> {
        let solution = field_text(record, "answer")?;
        let (reasoning, number) = split_solution(&solution).ok_or_else(|| AdapterError::InvalidField {
            field: "answer".to_string(),
            reason: format!("no `{}` marker", ANSWER_MARKER),
        })?;
        Ok(format!(
            "Question: {}\n{}\nAnswer: {} The answer is {}.\n\n",
            field_text(record, "question")?,
            COT_CUE,
            reasoning.trim().replace('\n', " "),
            number
        ))
    }
}

fn number_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+\.\d+|-?\d+").expect("static pattern is valid"))
}

/// Split a reference solution into its reasoning and the cleaned final number.
fn split_solution(solution: &str) -> Option<(&str, String)> {
    let (reasoning, number) = solution.rsplit_once(ANSWER_MARKER)?;
    Some((reasoning, number.trim().replace(',', "")))
}

/// Last number in `text`, ignoring anything after a follow-up `Question:`.
fn extract_last_number(text: &str) -> Option<String> {
    let head = text.split("Question:").next().unwrap_or(text).replace(',', "");
    number_pattern()
        .find_iter(&head)
        .last()
        .map(|m| m.as_str().to_string())
}

impl DataAdapter for Gsm8kAdapter {
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
        let mut prompt = String::new();
        for shot in few_shot {
            prompt.push_str(&Self::exemplar(shot)?);
        }
        prompt.push_str(&format!(
            "Question: {}\n{}\nAnswer:",
            field_text(record, "question")?,
            COT_CUE
        ));
        Ok(PromptBundle::new(prompt).with_system_prompt(&self.settings.prompt_template))
    }

    fn get_gold_answer(&self, record: &Record) -> AdapterResult<String> {
        let solution = field_text(record, "answer")?;
        split_solution(&solution)
            .map(|(_, number)| number)
            .ok_or_else(|| AdapterError::InvalidField {
                field: "answer".to_string(),
                reason: format!("no `{}` marker", ANSWER_MARKER),
            })
    }

    fn parse_pred_result(&self, result: &str, _record: &Record, _eval_type: EvalType) -> String {
        extract_last_number(result).unwrap_or_default()
    }

    /// Numbers compare by value, so `18` matches `18.0`.
    fn match_score(&self, gold: &str, pred: &str) -> f64 {
        match (gold.trim().parse::<f64>(), pred.trim().parse::<f64>()) {
            (Ok(g), Ok(p)) if (g - p).abs() < 1e-6 => 1.0,
            (Ok(_), Ok(_)) => 0.0,
            _ => exact_match(gold, pred),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::record;
    use rand::SeedableRng;
    use serde_json::json;

    fn row(question: &str, answer: &str) -> Record {
        record(json!({"question": question, "answer": answer}))
    }

    fn adapter() -> Gsm8kAdapter {
        Gsm8kAdapter::new(AdapterSettings {
            few_shot_num: 4,
            ..Default::default()
        })
    }

    #[test]
    fn test_gold_answer_strips_commas() {
        let rec = row("How many?", "She sells 3 x 400 = <<3*400=1200>>1200.\n#### 1,200");
        assert_eq!(adapter().get_gold_answer(&rec).unwrap(), "1200");
        assert!(adapter().get_gold_answer(&row("Q", "no marker")).is_err());
    }

    #[test]
    fn test_last_number_before_follow_up_question() {
        assert_eq!(
            extract_last_number("16 - 3 - 4 = 9, so 9 * 2 = 18.\nQuestion: what about 7?").as_deref(),
            Some("18")
        );
        assert_eq!(extract_last_number("costs $1,250.50 total").as_deref(), Some("1250.50"));
        assert_eq!(extract_last_number("a loss of -3").as_deref(), Some("-3"));
        assert_eq!(extract_last_number("no digits"), None);
    }

    #[test]
    fn test_numeric_match() {
        let adapter = adapter();
        assert_eq!(adapter.match_score("18", "18.0"), 1.0);
        assert_eq!(adapter.match_score("18", "17"), 0.0);
        assert_eq!(adapter.match_score("18", ""), 0.0);
    }

    #[test]
    fn test_prompt_with_exemplars() {
        let shots = vec![row("1+1?", "1+1=2\n#### 2")];
        let bundle = adapter()
            .gen_prompt(&row("2+2?", "#### 4"), "main", &shots, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(
            bundle.data[0],
            "Question: 1+1?\nLet's think step by step\nAnswer: 1+1=2 The answer is 2.\n\nQuestion: 2+2?\nLet's think step by step\nAnswer:"
        );
        assert_eq!(bundle.system_prompt, None);
    }
}
