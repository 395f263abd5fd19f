//! Answer extraction from free-form model output
//!
//! Model responses are unstructured text in English or Chinese. The parsers
//! here pull a discrete answer (an option letter, a word or a span) out of
//! that text using ordered regular-expression ladders: the first pattern that
//! matches anywhere in the text wins, so explicit answer declarations are
//! listed before incidental single-character matches.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use regex::Regex;

/// Placeholder substituted with the `|`-joined option set.
const OPTIONS_TOKEN: &str = "{o}";

/// Priority ladder for multiple-choice answers.
///
/// The ninth entry is two patterns joined without a separator
/// (`故选?...` immediately followed by `只有选?项?...`). It is kept joined so
/// extraction behaves exactly like existing result sets.
const CHOICE_PATTERNS: &[&str] = &[
    r"答案是?\s?([{o}])",
    r"答案是?\s?：([{o}])",
    r"答案是?\s?:([{o}])",
    r"答案应该?是\s?([{o}])",
    r"答案应该?选\s?([{o}])",
    r"答案为\s?([{o}])",
    r"答案选\s?([{o}])",
    r"选择?\s?([{o}])",
    r"故选?\s?([{o}])只有选?项?\s?([{o}])\s?是?对",
    r"只有选?项?\s?([{o}])\s?是?错",
    r"只有选?项?\s?([{o}])\s?不?正确",
    r"只有选?项?\s?([{o}])\s?错误",
    r"说法不?对选?项?的?是\s?([{o}])",
    r"说法不?正确选?项?的?是\s?([{o}])",
    r"说法错误选?项?的?是\s?([{o}])",
    r"([{o}])\s?是正确的",
    r"([{o}])\s?是正确答案",
    r"选项\s?([{o}])\s?正确",
    r"所以答\s?([{o}])",
    r"1.\s?([{o}])[.。$]?$",
    r"所以\s?([{o}][.。$]?$)",
    r"所有\s?([{o}][.。$]?$)",
    r"[\s，：:,]([{o}])[。，,\.]?$",
    r"[\s，,：:][故即]([{o}])[。\.]?$",
    r"[\s，,：:]因此([{o}])[。\.]?$",
    r"[是为。]\s?([{o}])[。\.]?$",
    r"因此\s?([{o}])[。\.]?$",
    r"显然\s?([{o}])[。\.]?$",
    r"答案是\s?(\S+)(?:。|$)",
    r"答案应该是\s?(\S+)(?:。|$)",
    r"答案为\s?(\S+)(?:。|$)",
    r"答案是(.*?)[{o}]",
    r"答案为(.*?)[{o}]",
    r"固选(.*?)[{o}]",
    r"答案应该是(.*?)[{o}]",
    r"[Tt]he answer is [{o}]",
    r"[Tt]he correct answer is [{o}]",
    r"[Tt]he correct answer is:\n[{o}]",
    r"(\s|^)[{o}][\s。，,\.$]",
    r"[{o}]",
    r"^选项\s?([{o}])",
    r"^([{o}])\s?选?项",
    r"(\s|^)[{o}][\s。，,：:\.$]",
    r"(\s|^)[{o}](\s|$)",
    r"1.\s?(.*?)$",
];

/// Ladder for single-word answers without a fixed option set.
const WORD_PATTERNS: &[&str] = &[
    r"[Aa]nswer:\s*(\w+)",
    r"[Tt]he correct answer is:\s*(\w+)",
    r"[Tt]he correct answer is:\n\s*(\w+)",
    r"[Tt]he correct answer is:\n\n-\s*(\w+)",
    r"[Tt]he answer might be:\n\n-\s*(\w+)",
    r"[Tt]he answer is \s*(\w+)",
];

type Ladder = Arc<Vec<Regex>>;

fn choice_ladders() -> &'static Mutex<HashMap<String, Ladder>> {
    static LADDERS: OnceLock<Mutex<HashMap<String, Ladder>>> = OnceLock::new();
    LADDERS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn word_ladder() -> &'static [Regex] {
    static LADDER: OnceLock<Vec<Regex>> = OnceLock::new();
    LADDER.get_or_init(|| compile_all(WORD_PATTERNS.iter().map(|p| p.to_string())))
}

fn capital_run() -> &'static Regex {
    static RUN: OnceLock<Regex> = OnceLock::new();
    RUN.get_or_init(|| Regex::new(r"([A-D]+)").expect("static pattern is valid"))
}

/// Rewrite end anchors so they also match before one trailing newline.
///
/// `$` inside a character class is a literal and is left alone.
fn end_anchors_allow_newline(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars();
    let mut in_class = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '[' if !in_class => {
                in_class = true;
                out.push(c);
                // a leading `]` (or `^]`) is part of the class
                let rest = chars.as_str();
                let skip = if rest.starts_with("^]") {
                    2
                } else if rest.starts_with(']') {
                    1
                } else {
                    0
                };
                out.push_str(&rest[..skip]);
                chars = rest[skip..].chars();
            }
            ']' if in_class => {
                in_class = false;
                out.push(c);
            }
            '$' if !in_class => out.push_str(r"\n?\z"),
            _ => out.push(c),
        }
    }
    out
}

fn compile_all(patterns: impl Iterator<Item = String>) -> Vec<Regex> {
    patterns
        .map(|pattern| end_anchors_allow_newline(&pattern))
        .filter_map(|pattern| match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!("Skipping answer pattern {}: {}", pattern, e);
                None
            }
        })
        .collect()
}

/// Compiled ladder for an option set, built once per distinct set.
fn ladder_for(options_concat: &str) -> Ladder {
    let mut cache = match choice_ladders().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    cache
        .entry(options_concat.to_string())
        .or_insert_with(|| {
            Arc::new(compile_all(
                CHOICE_PATTERNS
                    .iter()
                    .map(|p| p.replace(OPTIONS_TOKEN, options_concat)),
            ))
        })
        .clone()
}

/// Stateless answer extractors.
pub struct ResponseParser;

impl ResponseParser {
    /// First uppercase character scanning left to right.
    pub fn parse_first_capital(text: &str) -> Option<char> {
        text.chars().find(|c| c.is_uppercase())
    }

    /// First uppercase character scanning right to left.
    pub fn parse_last_capital(text: &str) -> Option<char> {
        text.chars().rev().find(|c| c.is_uppercase())
    }

    /// Find the first valid option declared in `text`.
    ///
    /// Patterns are tried in priority order. When a pattern matches, the
    /// options are scanned in the order given and the first one contained in
    /// the matched span is returned. A match containing none of the options
    /// falls through to the next pattern.
    pub fn parse_first_option_with_choices<S: AsRef<str>>(
        text: &str,
        options: &[S],
    ) -> Option<String> {
        let options_concat = options
            .iter()
            .map(|o| regex::escape(o.as_ref()))
            .collect::<Vec<_>>()
            .join("|");

        for regex in ladder_for(&options_concat).iter() {
            if let Some(found) = regex.find(text) {
                let span = found.as_str();
                if let Some(option) = options.iter().find(|o| span.contains(o.as_ref())) {
                    return Some(option.as_ref().to_string());
                }
            }
        }
        None
    }

    /// Find the first single-word answer declared in `text`.
    pub fn parse_first_option(text: &str) -> Option<String> {
        word_ladder()
            .iter()
            .find_map(|re| re.captures(text))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// First run of consecutive `A`-`D` characters, for multi-select answers.
    pub fn parse_first_capital_multi(text: &str) -> Option<String> {
        capital_run()
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Last occurrence of any character from `options` (e.g. `"ABCD"`).
    pub fn parse_last_option(text: &str, options: &str) -> Option<String> {
        if options.is_empty() {
            return None;
        }
        let class: String = options.chars().map(|c| regex::escape(&c.to_string())).collect();
        let re = Regex::new(&format!("([{}])", class)).ok()?;
        re.find_iter(text).last().map(|m| m.as_str().to_string())
    }
}
