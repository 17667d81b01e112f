mod common;

use std::io::Write;
use std::sync::Arc;

use common::TestHarness;
use pipewright::interfaces::{
    ConfigurationLoader, EngineConfig, EvaluatorError, JsonConfigLoader, JsonEvaluator,
    ScriptEvaluator,
};
use pipewright::pipeline::{Agent, Pipeline, Stage, StepInvocation};
use pipewright::runtime::{JobLauncher, JobStatus};
use serde_json::json;

fn write_temp(contents: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp file");
    file.write_all(contents.as_bytes()).expect("write");
    file
}

#[tokio::test]
async fn json_evaluator_round_trips_a_description() {
    let pipeline = Pipeline::builder("from-disk")
        .agent(Agent::Any)
        .env("CI", "true")
        .stage(Stage::new("A").with_step(StepInvocation::new("echo").with_arg(json!("hi"))))
        .build()
        .unwrap();
    let file = write_temp(&serde_json::to_string_pretty(&pipeline).unwrap(), ".json");

    let evaluated = JsonEvaluator.evaluate(file.path()).await.unwrap();
    assert_eq!(evaluated, pipeline);
}

#[tokio::test]
async fn json_evaluator_reports_location_on_bad_input() {
    let file = write_temp("{\n  \"name\": \"x\",\n  broken\n}\n", ".json");
    let err = JsonEvaluator.evaluate(file.path()).await.unwrap_err();
    match err {
        EvaluatorError::Script { line, column, .. } => {
            assert!(line >= 1);
            assert!(column >= 1);
        }
        other => panic!("expected Script error, got {other:?}"),
    }
}

#[tokio::test]
async fn launch_script_runs_an_evaluated_description() {
    let harness = TestHarness::new();
    let pipeline = Pipeline::builder("scripted")
        .stage(Stage::new("A").with_step(StepInvocation::new("echo").with_arg(json!("ok"))))
        .build()
        .unwrap();
    let file = write_temp(&serde_json::to_string(&pipeline).unwrap(), ".json");

    let result = JobLauncher::new(Arc::clone(&harness.registry))
        .without_validation()
        .launch_script(&JsonEvaluator, file.path(), harness.ctx("scripted"))
        .await;
    assert_eq!(result.status, JobStatus::Success);
    assert_eq!(result.stages.len(), 1);
}

#[tokio::test]
async fn validation_gate_refuses_dangerous_scripts() {
    let harness = TestHarness::new();
    let script = "pipeline {\n    System.exit(0)\n}\n";
    let file = write_temp(script, ".pipeline");

    let result = JobLauncher::new(Arc::clone(&harness.registry))
        .launch_script(&JsonEvaluator, file.path(), harness.ctx("gated"))
        .await;
    assert_eq!(result.status, JobStatus::Failure);
    assert!(result.stages.is_empty());
}

#[tokio::test]
async fn unsupported_agent_kind_fails_the_launch() {
    let harness = TestHarness::new();
    let pipeline = Pipeline::builder("containered")
        .agent(Agent::Docker {
            image: "rust".into(),
            tag: "1.89".into(),
            host: None,
        })
        .stage(Stage::new("A").with_step(StepInvocation::new("echo").with_arg(json!("hi"))))
        .build()
        .unwrap();

    let result = JobLauncher::new(Arc::clone(&harness.registry))
        .launch(Ok(pipeline), harness.ctx("containered"))
        .await;
    assert_eq!(result.status, JobStatus::Failure);
    assert!(result.stages.is_empty());
}

#[test]
fn json_config_loader_round_trips_settings() {
    let config = EngineConfig::default();
    let file = write_temp(&serde_json::to_string(&config).unwrap(), ".json");
    let loaded = JsonConfigLoader.load(file.path()).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.monitor_config().warn_threshold, 0.8);
}

#[test]
fn json_config_loader_names_the_path_on_failure() {
    let file = write_temp("not json", ".json");
    let err = JsonConfigLoader.load(file.path()).unwrap_err();
    assert!(err.to_string().contains(&file.path().display().to_string()));
}
