//! Compose file on disk -> loader -> composer

use async_trait::async_trait;
use stackcompose_core::application::{Composer, RunOptions, RunRequest};
use stackcompose_core::cancel::CancelToken;
use stackcompose_core::domain::DomainError;
use stackcompose_core::port::session::mocks::StaticSessionProvider;
use stackcompose_core::port::stack_backend::mocks::ScriptedBackend;
use stackcompose_core::port::{BackendError, StackBackend, StackCall};
use stackcompose_infra_file::{sample_compose, ComposeFileLoader, LoadError};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Fresh scratch directory per test
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "stackcompose_it_{}_{}",
        name,
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// (stack, template, region) for every call
#[derive(Default)]
struct RecordingBackend {
    seen: Mutex<Vec<(String, String, Option<String>)>>,
}

impl RecordingBackend {
    fn record(&self, call: &StackCall<'_>) -> Result<(), BackendError> {
        self.seen.lock().unwrap().push((
            call.stack.stack_name.clone(),
            call.stack.template_file.clone(),
            call.session.region.clone(),
        ));
        Ok(())
    }
}

#[async_trait]
impl StackBackend for RecordingBackend {
    async fn apply(&self, call: &StackCall<'_>, _: &CancelToken) -> Result<(), BackendError> {
        self.record(call)
    }

    async fn apply_dry_run(&self, call: &StackCall<'_>, _: &CancelToken) -> Result<(), BackendError> {
        self.record(call)
    }

    async fn destroy(&self, call: &StackCall<'_>, _: &CancelToken) -> Result<(), BackendError> {
        self.record(call)
    }

    async fn destroy_dry_run(&self, call: &StackCall<'_>, _: &CancelToken) -> Result<(), BackendError> {
        self.record(call)
    }
}

/// Test 1: YAML file runs with resolved templates and session settings
#[tokio::test]
async fn test_yaml_file_deploys() {
    let dir = scratch_dir("yaml");
    let file = dir.join("stack-compose.yml");
    std::fs::write(
        &file,
        r#"
description: two levels
vars:
  AWS_REGION: eu-west-1
jobs:
  base:
    stacks:
      - stack_name: base-net
        template_file: templates/net.yml
  app:
    order: 5
    stacks:
      - stack_name: app-svc
        template_file: /abs/svc.yml
        parameters:
          Size: "3"
"#,
    )
    .unwrap();

    let config = ComposeFileLoader::load(&file).unwrap();
    let backend = Arc::new(RecordingBackend::default());
    let report = Composer::new(backend.clone(), Arc::new(StaticSessionProvider))
        .with_options(RunOptions::immediate())
        .run(&config, RunRequest::deploy())
        .await
        .unwrap();

    assert!(report.is_success());
    // `base` has no order, so it defaults to 0 and runs first
    assert_eq!(report.completed_orders, vec![0, 5]);

    let seen = backend.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, "base-net");
    assert_eq!(
        PathBuf::from(&seen[0].1),
        dir.join("templates").join("net.yml")
    );
    assert_eq!(seen[1].1, "/abs/svc.yml");
    assert!(seen
        .iter()
        .all(|(_, _, region)| region.as_deref() == Some("eu-west-1")));

    std::fs::remove_dir_all(&dir).ok();
    println!("✅ Test 1: YAML file deploys");
}

/// Test 2: JSON file destroys in reverse
#[tokio::test]
async fn test_json_file_destroys() {
    let dir = scratch_dir("json");
    let file = dir.join("compose.json");
    std::fs::write(
        &file,
        r#"{
  "jobs": {
    "db": { "order": 1, "stacks": [
      { "stack_name": "db-subnets", "template_file": "a.yml" },
      { "stack_name": "db-cluster", "template_file": "b.yml" }
    ]},
    "api": { "order": 2, "stacks": [
      { "stack_name": "api", "template_file": "c.yml" }
    ]}
  }
}"#,
    )
    .unwrap();

    let config = ComposeFileLoader::load(&file).unwrap();
    let backend = Arc::new(ScriptedBackend::new());
    let report = Composer::new(backend.clone(), Arc::new(StaticSessionProvider))
        .with_options(RunOptions::immediate())
        .run(&config, RunRequest::destroy())
        .await
        .unwrap();

    assert!(report.is_success());
    let order: Vec<_> = backend.calls().into_iter().map(|c| c.stack).collect();
    assert_eq!(order, vec!["api", "db-cluster", "db-subnets"]);

    std::fs::remove_dir_all(&dir).ok();
    println!("✅ Test 2: JSON file destroys in reverse");
}

/// Test 3: invalid files are rejected before anything runs
#[tokio::test]
async fn test_invalid_file_rejected() {
    let dir = scratch_dir("invalid");
    let file = dir.join("dup.yml");
    std::fs::write(
        &file,
        r#"
jobs:
  one:
    stacks:
      - { stack_name: shared, template_file: a.yml }
  two:
    stacks:
      - { stack_name: shared, template_file: b.yml }
"#,
    )
    .unwrap();

    let err = ComposeFileLoader::load(&file).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Invalid(DomainError::DuplicateStack { ref stack, .. }) if stack == "shared"
    ));

    let missing = ComposeFileLoader::load(dir.join("nope.yml")).unwrap_err();
    assert!(matches!(missing, LoadError::Read { .. }));

    std::fs::remove_dir_all(&dir).ok();
    println!("✅ Test 3: invalid files rejected");
}

/// Test 4: the generated sample runs as a dry run
#[tokio::test]
async fn test_sample_dry_run() {
    let dir = scratch_dir("sample");
    let file = dir.join("stack-compose.yml");
    std::fs::write(&file, sample_compose()).unwrap();

    let config = ComposeFileLoader::load(&file).unwrap();
    let backend = Arc::new(ScriptedBackend::new());
    let report = Composer::new(backend.clone(), Arc::new(StaticSessionProvider))
        .with_options(RunOptions::immediate())
        .run(&config, RunRequest::deploy().dry_run())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.total_jobs, 3);
    assert_eq!(backend.call_count(), 4);
    assert_eq!(backend.calls()[3].stack, "sample-service");

    std::fs::remove_dir_all(&dir).ok();
    println!("✅ Test 4: sample file dry run");
}
