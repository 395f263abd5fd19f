//! AI2 Reasoning Challenge (ARC)
//!
//! Rows look like
//! `{"question": "...", "choices": {"text": [...], "label": ["A", ...]}, "answerKey": "B"}`.
//! Labels come from the data and are not shuffled.

use rand::rngs::StdRng;
use serde_json::Value;

use super::{
    field_text, AdapterError, AdapterResult, AdapterSettings, Benchmark, DataAdapter, PromptBundle,
    Record,
};
use crate::analysis::{exact_match, Metric, ResponseParser};
use crate::config::EvalType;

pub fn benchmark() -> Benchmark {
    Benchmark::new("arc", "modelscope/ai2_arc", |settings| Box::new(ArcAdapter::new(settings)))
        .with_subsets(&["ARC-Easy", "ARC-Challenge"])
        .with_metrics(&[Metric::AverageAccuracy])
        .with_few_shot(0)
        .with_splits(Some("train"), "test")
}

pub struct ArcAdapter {
    settings: AdapterSettings,
}

impl ArcAdapter {
    pub fn new(settings: AdapterSettings) -> Self {
        Self { settings }
    }

    /// `(label, text)` pairs in dataset order.
    fn options(record: &Record) -> AdapterResult<Vec<(String, String)>> {
        let choices = record
            .get("choices")
            .and_then(Value::as_object)
            .ok_or_else(|| AdapterError::MissingField("choices".to_string()))?;

        let strings = |key: &str| -> AdapterResult<Vec<String>> {
            choices
                .get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                        .collect()
                })
                .ok_or_else(|| AdapterError::MissingField(format!("choices.{}", key)))
        };

        let texts = strings("text")?;
        let labels = strings("label")?;
        if texts.len() != labels.len() {
            return Err(AdapterError::InvalidField {
                field: "choices".to_string(),
                reason: format!("{} labels for {} options", labels.len(), texts.len()),
            });
        }
        Ok(labels.into_iter().zip(texts).collect())
    }

    fn render(record: &Record, with_answer: bool) -> AdapterResult<String> {
        let mut out = format!("Question: {}\n", field_text(record, "question")?);
        for (label, text) in Self::options(record)? {
            out.push_str(&format!("{}. {}\n", label, text));
        }
        out.push_str("Answer:");
        if with_answer {
            out.push_str(&format!(" {}\n\n", field_text(record, "answerKey")?));
        }
        Ok(out)
    }
}

impl DataAdapter for ArcAdapter {
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
            prompt.push_str(&Self::render(shot, true)?);
        }
        prompt.push_str(&Self::render(record, false)?);

        let labels: Vec<String> = Self::options(record)?.into_iter().map(|(l, _)| l).collect();
        let mut bundle = PromptBundle::new(prompt).with_system_prompt(&self.settings.prompt_template);
        bundle.multi_choices = labels;
        Ok(bundle)
    }

    fn get_gold_answer(&self, record: &Record) -> AdapterResult<String> {
        field_text(record, "answerKey")
    }

    fn parse_pred_result(&self, result: &str, record: &Record, eval_type: EvalType) -> String {
        let labels: Vec<String> = Self::options(record)
            .map(|opts| opts.into_iter().map(|(l, _)| l).collect())
            .unwrap_or_default();

        let parsed = match eval_type {
            // Custom models usually return a bare label
            EvalType::Custom => ResponseParser::parse_first_capital(result).map(String::from),
            EvalType::Checkpoint => ResponseParser::parse_first_option_with_choices(result, &labels),
        };
        parsed.unwrap_or_default()
    }

    fn match_score(&self, gold: &str, pred: &str) -> f64 {
        exact_match(gold, pred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::record;
    use rand::SeedableRng;
    use serde_json::json;

    fn row(question: &str, key: &str) -> Record {
        record(json!({
            "id": "Mercury_1",
            "question": question,
            "choices": {"text": ["dry palms", "wet palms", "oily palms", "lotion"], "label": ["A", "B", "C", "D"]},
            "answerKey": key
        }))
    }

    fn adapter() -> ArcAdapter {
        ArcAdapter::new(AdapterSettings::default())
    }

    #[test]
    fn test_zero_shot_prompt() {
        let bundle = adapter()
            .gen_prompt(&row("Which surface makes the most heat?", "A"), "ARC-Easy", &[], &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(
            bundle.data[0],
            "Question: Which surface makes the most heat?\nA. dry palms\nB. wet palms\nC. oily palms\nD. lotion\nAnswer:"
        );
        assert_eq!(bundle.multi_choices, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_few_shot_exemplars_include_answers() {
        let shots = vec![row("Shot?", "C")];
        let bundle = adapter()
            .gen_prompt(&row("Final?", "A"), "ARC-Easy", &shots, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert!(bundle.data[0].starts_with("Question: Shot?\n"));
        assert!(bundle.data[0].contains("Answer: C\n\nQuestion: Final?"));
    }

    #[test]
    fn test_parse_and_match() {
        let adapter = adapter();
        let rec = row("Q?", "B");
        let gold = adapter.get_gold_answer(&rec).unwrap();
        let pred = adapter.parse_pred_result("The answer is B", &rec, EvalType::Checkpoint);
        assert_eq!(adapter.match_score(&gold, &pred), 1.0);

        let pred = adapter.parse_pred_result("C", &rec, EvalType::Custom);
        assert_eq!(adapter.match_score(&gold, &pred), 0.0);
    }

    #[test]
    fn test_mismatched_choices_rejected() {
        let rec = record(json!({
            "question": "Q?",
            "choices": {"text": ["a", "b"], "label": ["A"]},
            "answerKey": "A"
        }));
        let result = adapter().gen_prompt(&rec, "ARC-Easy", &[], &mut StdRng::seed_from_u64(0));
        assert!(matches!(result, Err(AdapterError::InvalidField { .. })));
    }
}
