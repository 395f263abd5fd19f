//! GPQA: graduate-level multiple-choice science questions
//!
//! Rows carry the correct answer and three distractors as separate fields.
//! The four options are shuffled per record and relabelled `A`-`D`; the
//! letter that ends up on the correct option is recorded as `answer`.

use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use regex::Regex;
use serde_json::Value;

use super::{
    field_text, AdapterResult, AdapterSettings, Benchmark, DataAdapter, PromptBundle, Record, ABCD,
};
use crate::analysis::{exact_match, Metric, ResponseParser};
use crate::config::EvalType;

const FEW_SHOT_HEADER: &str = "Here are some example questions from experts. Answer the final question yourself, following the format of the previous questions exactly.\n";
const ZERO_SHOT_PREFIX: &str = "What is the correct answer to this question:";
const COT_SUFFIX: &str = "Let's think step by step: ";

const QUESTION: &str = "Question";
const CORRECT: &str = "Correct Answer";
const INCORRECT: [&str; 3] = ["Incorrect Answer 1", "Incorrect Answer 2", "Incorrect Answer 3"];
const EXPLANATION: &str = "Explanation";

pub fn benchmark() -> Benchmark {
    Benchmark::new("gpqa", "modelscope/gpqa", |settings| Box::new(GpqaAdapter::new(settings)))
        .with_subsets(&["gpqa_extended", "gpqa_main", "gpqa_diamond"])
        .with_metrics(&[Metric::Pass1])
        .with_few_shot(5)
        // only a train split is published
        .with_splits(Some("train"), "train")
}

pub struct GpqaAdapter {
    settings: AdapterSettings,
}

impl GpqaAdapter {
    pub fn new(settings: AdapterSettings) -> Self {
        Self { settings }
    }

    /// Shuffled options and the letter of the correct one.
    fn shuffled_choices(record: &Record, rng: &mut StdRng) -> AdapterResult<(Vec<String>, String)> {
        let correct = preprocess(&field_text(record, CORRECT)?);
        let mut choices: Vec<String> = INCORRECT
            .iter()
            .map(|key| {
                field_text(record, key)
                    .map(|t| preprocess(&t))
                    .unwrap_or_else(|_| " ".to_string())
            })
            .collect();
        choices.push(correct.clone());
        choices.shuffle(rng);

        let index = choices.iter().position(|c| *c == correct).unwrap_or(3);
        Ok((choices, ABCD[index].to_string()))
    }

    fn render_exemplar(record: &Record, rng: &mut StdRng) -> AdapterResult<String> {
        let (choices, letter) = Self::shuffled_choices(record, rng)?;
        let explanation = field_text(record, EXPLANATION).unwrap_or_default();
        Ok(format!(
            "Question: {}\n{}{}\n{}\nThe correct answer is ({})\n",
            field_text(record, QUESTION)?,
            form_options(&choices),
            COT_SUFFIX,
            explanation.trim(),
            letter
        ))
    }
}

impl DataAdapter for GpqaAdapter {
    fn settings(&self) -> &AdapterSettings {
        &self.settings
    }

    fn gen_prompt(
        &self,
        record: &Record,
        _subset: &str,
        few_shot: &[Record],
        rng: &mut StdRng,
    ) -> AdapterResult<PromptBundle> {
        let question = field_text(record, QUESTION)?;

        let mut prompt = String::new();
        if few_shot.is_empty() || self.settings.few_shot_num == 0 {
            prompt.push_str(ZERO_SHOT_PREFIX);
        } else {
            let exemplars = few_shot
                .iter()
                .map(|shot| Self::render_exemplar(shot, rng))
                .collect::<AdapterResult<Vec<_>>>()?;
            prompt.push_str(FEW_SHOT_HEADER);
            prompt.push_str(&exemplars.join("\n"));
            prompt.push_str("\nQuestion: ");
        }

        let (choices, letter) = Self::shuffled_choices(record, rng)?;
        prompt.push_str(&format!("{}\n{}{}", question, form_options(&choices), COT_SUFFIX));

        let mut bundle = PromptBundle::new(prompt)
            .with_choices(&ABCD)
            .with_system_prompt(&self.settings.prompt_template);
        bundle
            .record_updates
            .insert("answer".to_string(), Value::String(letter));
        Ok(bundle)
    }

    fn get_gold_answer(&self, record: &Record) -> AdapterResult<String> {
        field_text(record, "answer")
    }

    fn parse_pred_result(&self, result: &str, _record: &Record, _eval_type: EvalType) -> String {
        ResponseParser::parse_first_option_with_choices(result, &ABCD).unwrap_or_default()
    }

    fn match_score(&self, gold: &str, pred: &str) -> f64 {
        exact_match(gold, pred)
    }
}

fn bracketed() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[.*?\]").expect("static pattern is valid"))
}

/// Clean an option: trim, turn ` [title]` into `. `, drop bracketed spans,
/// collapse double spaces.
fn preprocess(text: &str) -> String {
    let text = text.trim().replace(" [title]", ". ");
    bracketed().replace_all(&text, "").replace("  ", " ")
}

fn form_options(choices: &[String]) -> String {
    let mut out = String::from("Choices:\n");
    for (label, choice) in ABCD.iter().zip(choices) {
        out.push_str(&format!("({}) {}\n", label, choice));
    }
    out
}
