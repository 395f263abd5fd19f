//! Task input handling, batch semantics and backend dispatch

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use llm_evalkit::config::{ConfigError, EvalBackend, TaskConfig};
use llm_evalkit::datasets::{record, MemoryDatasetSource};
use llm_evalkit::runner::{BackendRunner, RunError, RunOutput, Runner, TaskInput};

#[derive(Default)]
struct RecordingBackend {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl BackendRunner for RecordingBackend {
    async fn run(&self, config: &TaskConfig) -> Result<(), String> {
        let model = config.model.as_ref().map(|m| m.id().to_string()).unwrap_or_default();
        self.seen.lock().unwrap().push(model);
        Ok(())
    }
}

fn arc_source() -> Arc<MemoryDatasetSource> {
    let row = record(json!({
        "question": "Which is largest?",
        "choices": {"text": ["1", "2", "3", "4"], "label": ["A", "B", "C", "D"]},
        "answerKey": "D"
    }));
    Arc::new(
        MemoryDatasetSource::new()
            .with_split("ARC-Easy", "test", vec![row.clone()])
            .with_split("ARC-Challenge", "test", vec![row]),
    )
}

fn dry_run_task(dir: &std::path::Path) -> TaskConfig {
    TaskConfig::new("m", &["arc"])
        .with_dry_run(true)
        .with_work_dir(dir)
}

#[tokio::test]
async fn test_missing_model_is_config_error() {
    let config = TaskConfig {
        datasets: Some(vec!["arc".to_string()]),
        ..Default::default()
    };
    let result = Runner::new().run_task(config).await;
    assert!(matches!(
        result,
        Err(RunError::Config(ConfigError::MissingModelOrDatasets))
    ));
}

#[tokio::test]
async fn test_unknown_benchmark_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = TaskConfig::new("m", &["arc", "no_such_bench"])
        .with_dry_run(true)
        .with_work_dir(dir.path());
    match Runner::new().run_task(config).await {
        Err(RunError::Config(ConfigError::UnknownBenchmark { name, available })) => {
            assert_eq!(name, "no_such_bench");
            assert!(available.contains("gsm8k"));
        }
        other => panic!("expected unknown benchmark, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unsupported_config_extension() {
    let result = Runner::new().run_task(PathBuf::from("task.toml")).await;
    assert!(matches!(
        result,
        Err(RunError::Config(ConfigError::UnsupportedFormat(_)))
    ));
}

#[tokio::test]
async fn test_dict_and_file_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Runner::new().with_source(arc_source());

    let dict = json!({
        "model": "m",
        "datasets": ["arc"],
        "dry_run": true,
        "work_dir": dir.path().join("from_dict"),
    });
    let results = runner.run_task(dict).await.unwrap().into_single().unwrap();
    assert_eq!(results["arc"].num(), 2);

    let path = dir.path().join("task.yaml");
    dry_run_task(&dir.path().join("from_file")).dump_yaml(&path).unwrap();
    let results = runner.run_task(path).await.unwrap().into_single().unwrap();
    assert_eq!(results["arc"].num(), 2);
}

#[tokio::test]
async fn test_batch_runs_in_order_and_skips_nonfatal_failures() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Runner::new().with_source(arc_source());

    let third_party = TaskConfig {
        eval_backend: EvalBackend::ThirdParty,
        ..dry_run_task(&dir.path().join("b"))
    };
    let batch = vec![
        dry_run_task(&dir.path().join("a")),
        third_party,
        dry_run_task(&dir.path().join("c")),
    ];

    let output = runner.run_task(batch).await.unwrap();
    let all = match output {
        RunOutput::Batch(all) => all,
        other => panic!("expected batch output, got {:?}", other),
    };
    assert_eq!(all.len(), 3);
    assert!(all[0].contains_key("arc"));
    assert!(all[1].is_empty());
    assert!(all[2].contains_key("arc"));
}

#[tokio::test]
async fn test_batch_aborts_on_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Runner::new().with_source(arc_source());

    let batch = TaskInput::Batch(vec![
        dry_run_task(dir.path()).into(),
        json!({"datasets": ["arc"]}).into(),
    ]);
    let result = runner.run_task(batch).await;
    assert!(matches!(
        result,
        Err(RunError::Config(ConfigError::MissingModelOrDatasets))
    ));
}

#[tokio::test]
async fn test_external_backend_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::default());
    let runner = Runner::new().with_backend(EvalBackend::OpenCompass, backend.clone());

    let config = TaskConfig {
        eval_backend: EvalBackend::OpenCompass,
        ..TaskConfig::new("served-model", &["arc"]).with_work_dir(dir.path())
    };
    let results = runner.run_task(config).await.unwrap().into_single().unwrap();
    assert!(results.is_empty());
    assert_eq!(*backend.seen.lock().unwrap(), vec!["served-model".to_string()]);

    let config = TaskConfig {
        eval_backend: EvalBackend::VLMEvalKit,
        ..TaskConfig::new("served-model", &["arc"]).with_work_dir(dir.path())
    };
    assert!(matches!(
        runner.run_task(config).await,
        Err(RunError::BackendUnavailable(EvalBackend::VLMEvalKit))
    ));
}
