//! End-to-end evaluation tests over in-memory datasets

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use llm_evalkit::analysis::Score;
use llm_evalkit::benchmarks::{self, Benchmark, BenchmarkRegistry, Record};
use llm_evalkit::config::{EvalType, GenerationConfig, ModelSpec, TaskConfig};
use llm_evalkit::datasets::{record, MemoryDatasetSource};
use llm_evalkit::models::{CustomModel, ModelError, ModelResult};
use llm_evalkit::reporting::{EvalResults, SubsetReport};
use llm_evalkit::runner::{OutputsStructure, Runner};

/// Answers `B` to everything, fails on prompts mentioning FAIL, counts calls.
struct ScriptedModel {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl CustomModel for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn predict(&self, prompts: &[String], _config: &GenerationConfig) -> ModelResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompts.iter().any(|p| p.contains("FAIL")) {
            return Err(ModelError::Predict("scripted failure".to_string()));
        }
        Ok(vec!["B".to_string()])
    }
}

fn arc_row(question: &str, key: &str) -> Record {
    record(json!({
        "question": question,
        "choices": {"text": ["one", "two", "three", "four"], "label": ["A", "B", "C", "D"]},
        "answerKey": key
    }))
}

fn gsm8k_row(question: &str, number: u32) -> Record {
    record(json!({
        "question": question,
        "answer": format!("Work it out.\n#### {}", number)
    }))
}

fn gpqa_row(i: usize) -> Record {
    record(json!({
        "Question": format!("Which particle is number {}?", i),
        "Correct Answer": format!("right {}", i),
        "Incorrect Answer 1": "wrong one",
        "Incorrect Answer 2": "wrong two",
        "Incorrect Answer 3": "wrong three",
        "Explanation": format!("Because of reason {}.", i)
    }))
}

fn toy_registry() -> BenchmarkRegistry {
    let mut registry = BenchmarkRegistry::with_builtins();
    registry.register(Benchmark {
        name: "toy".to_string(),
        ..benchmarks::arc::benchmark().with_subsets(&["A", "B", "C"])
    });
    registry
}

fn toy_source() -> MemoryDatasetSource {
    MemoryDatasetSource::new()
        .with_split("A", "test", vec![arc_row("a1", "B"), arc_row("a2", "C")])
        .with_split("B", "test", vec![arc_row("b1", "B")])
        .with_split("C", "test", vec![arc_row("c1", "B"), arc_row("c2", "B"), arc_row("c3", "A")])
}

fn custom_task(model: Arc<dyn CustomModel>, work_dir: &std::path::Path) -> TaskConfig {
    TaskConfig {
        model: Some(ModelSpec::Custom(model)),
        datasets: Some(vec!["toy".to_string()]),
        eval_type: EvalType::Custom,
        work_dir: work_dir.to_path_buf(),
        ..Default::default()
    }
}

async fn run(runner: &Runner, config: TaskConfig) -> EvalResults {
    runner
        .run_task(config)
        .await
        .expect("run succeeds")
        .into_single()
        .expect("single result")
}

#[tokio::test]
async fn test_dry_run_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let source = MemoryDatasetSource::new()
        .with_split("ARC-Easy", "test", vec![arc_row("e1", "A"), arc_row("e2", "B")])
        .with_split("ARC-Challenge", "test", vec![arc_row("c1", "D")]);
    let runner = Runner::new().with_source(Arc::new(source));

    let config = TaskConfig::new("not-served", &["arc"])
        .with_dry_run(true)
        .with_work_dir(dir.path());
    let results = run(&runner, config).await;

    let report = &results["arc"];
    assert_eq!(report.model_name, "dummy");
    assert_eq!(report.subsets.len(), 2);
    assert_eq!(report.num(), 3);
    let score = report.score.primary();
    assert!((0.0..=1.0).contains(&score));

    let outputs = OutputsStructure::new(dir.path());
    assert!(outputs.report_path("dummy", "arc").is_file());
    assert!(outputs.subset_path("dummy", "arc", "ARC-Easy").is_file());
    assert!(outputs.subset_path("dummy", "arc", "ARC-Challenge").is_file());
    let configs: Vec<_> = std::fs::read_dir(&outputs.configs_dir).unwrap().collect();
    assert_eq!(configs.len(), 1);
}

#[tokio::test]
async fn test_scores_and_limit() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let model: Arc<dyn CustomModel> = Arc::new(ScriptedModel { calls: calls.clone() });
    let runner = Runner::new()
        .with_registry(toy_registry())
        .with_source(Arc::new(toy_source()));

    let results = run(&runner, custom_task(model.clone(), dir.path())).await;
    let report = &results["toy"];
    // A: 1/2, B: 1/1, C: 2/3 -> 4 correct out of 6
    assert_eq!(report.subsets[0].score, Score::Value(0.5));
    assert_eq!(report.subsets[1].score, Score::Value(1.0));
    assert_eq!(report.subsets[2].score, Score::Value(0.6667));
    assert_eq!(report.score, Score::Value(0.6667));
    assert_eq!(calls.load(Ordering::SeqCst), 6);

    let limited_dir = tempfile::tempdir().unwrap();
    let results = run(&runner, custom_task(model, limited_dir.path()).with_limit(1)).await;
    assert!(results["toy"].subsets.iter().all(|s| s.num == 1));
}

#[tokio::test]
async fn test_resume_skips_completed_subsets() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let model: Arc<dyn CustomModel> = Arc::new(ScriptedModel { calls: calls.clone() });
    let runner = Runner::new()
        .with_registry(toy_registry())
        .with_source(Arc::new(toy_source()));

    let fresh = run(&runner, custom_task(model.clone(), dir.path())).await;
    assert_eq!(calls.load(Ordering::SeqCst), 6);

    // Pretend the run died before subset C was written
    let outputs = OutputsStructure::new(dir.path());
    std::fs::remove_file(outputs.subset_path("scripted", "toy", "C")).unwrap();

    let resumed_config = TaskConfig {
        use_cache: Some(dir.path().to_path_buf()),
        ..custom_task(model, std::path::Path::new("ignored"))
    };
    let resumed = run(&runner, resumed_config).await;

    // Only C's three records were generated again
    assert_eq!(calls.load(Ordering::SeqCst), 9);
    assert_eq!(resumed, fresh);
    assert!(outputs.subset_path("scripted", "toy", "C").is_file());
}

#[tokio::test]
async fn test_example_failure_scores_zero_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let model: Arc<dyn CustomModel> = Arc::new(ScriptedModel {
        calls: Arc::new(AtomicUsize::new(0)),
    });
    let source = MemoryDatasetSource::new()
        .with_split("A", "test", vec![arc_row("fine", "B"), arc_row("FAIL here", "B"), arc_row("wrong", "A")])
        .with_split("B", "test", vec![arc_row("b", "B")])
        .with_split("C", "test", vec![arc_row("c", "B")]);
    let runner = Runner::new()
        .with_registry(toy_registry())
        .with_source(Arc::new(source));

    let results = run(&runner, custom_task(model, dir.path())).await;
    assert_eq!(results["toy"].subsets[0].score, Score::Value(0.3333));

    let subset = SubsetReport::read_from_file(
        OutputsStructure::new(dir.path()).subset_path("scripted", "toy", "A"),
    )
    .unwrap();
    assert_eq!(subset.num, 3);
    assert!(subset.reviews[0].error.is_none());
    let error = subset.reviews[1].error.as_deref().unwrap();
    assert!(error.starts_with("generate:"));
    assert!(subset.reviews[1].samples.is_empty());
}

#[tokio::test]
async fn test_missing_subset_is_omitted() {
    let dir = tempfile::tempdir().unwrap();
    let model: Arc<dyn CustomModel> = Arc::new(ScriptedModel {
        calls: Arc::new(AtomicUsize::new(0)),
    });
    let source = MemoryDatasetSource::new()
        .with_split("A", "test", vec![arc_row("a", "B")])
        .with_split("C", "test", vec![arc_row("c", "A")]);
    let runner = Runner::new()
        .with_registry(toy_registry())
        .with_source(Arc::new(source));

    let results = run(&runner, custom_task(model, dir.path())).await;
    let names: Vec<&str> = results["toy"].subsets.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["A", "C"]);
    assert_eq!(results["toy"].score, Score::Value(0.5));
}

#[tokio::test]
async fn test_few_shot_prompts_are_reproducible() {
    let train: Vec<Record> = (0..8).map(|i| gsm8k_row(&format!("train {}", i), i)).collect();
    let source = Arc::new(
        MemoryDatasetSource::new()
            .with_split("main", "train", train)
            .with_split("main", "test", vec![gsm8k_row("test 0", 3), gsm8k_row("test 1", 5)]),
    );
    let runner = Runner::new().with_source(source);

    let mut prompts = Vec::new();
    for _ in 0..2 {
        let dir = tempfile::tempdir().unwrap();
        let config = TaskConfig::new("m", &["gsm8k"])
            .with_dry_run(true)
            .with_work_dir(dir.path());
        run(&runner, config).await;

        let subset = SubsetReport::read_from_file(
            OutputsStructure::new(dir.path()).subset_path("dummy", "gsm8k", "main"),
        )
        .unwrap();
        prompts.push(
            subset
                .reviews
                .into_iter()
                .map(|r| r.prompt)
                .collect::<Vec<_>>(),
        );
    }

    assert_eq!(prompts[0], prompts[1]);
    // four exemplars plus the question itself
    assert_eq!(prompts[0][0][0].matches("Question:").count(), 5);
}

#[tokio::test]
async fn test_exemplars_exclude_the_record_being_evaluated() {
    let dir = tempfile::tempdir().unwrap();
    let rows: Vec<Record> = (0..3).map(gpqa_row).collect();
    let source = Arc::new(MemoryDatasetSource::new().with_split("gpqa_main", "train", rows));
    let runner = Runner::new().with_source(source);

    let config = TaskConfig::new("m", &["gpqa"])
        .with_dry_run(true)
        .with_work_dir(dir.path());
    run(&runner, config).await;

    let subset = SubsetReport::read_from_file(
        OutputsStructure::new(dir.path()).subset_path("dummy", "gpqa", "gpqa_main"),
    )
    .unwrap();
    assert_eq!(subset.num, 3);
    for (i, review) in subset.reviews.iter().enumerate() {
        let prompt = &review.prompt[0];
        let question = format!("Which particle is number {}?", i);
        assert_eq!(prompt.matches(&question).count(), 1, "{}", prompt);
        assert!(!prompt.contains(&format!("reason {}.", i)));
        // the other two rows are used as exemplars
        assert_eq!(prompt.matches("The correct answer is (").count(), 2);
    }
}
