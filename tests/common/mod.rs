//! Shared fixtures: a scripted `cf` and a throwaway `cf` home

#![allow(dead_code)]

use async_trait::async_trait;
use cf_tools::cf::cli::{CliRunner, ProcessResult, RunOptions};
use cf_tools::{CancellationToken, CfClient, CfConfig};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Replays canned results in order and records every invocation
#[derive(Default)]
pub struct ScriptedRunner {
    responses: Mutex<VecDeque<ProcessResult>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: ProcessResult) -> &Self {
        self.responses.lock().unwrap().push_back(result);
        self
    }

    pub fn push_stdout(&self, stdout: &str) -> &Self {
        self.push(ProcessResult::new(stdout.to_string(), String::new(), None, 0))
    }

    pub fn push_json(&self, value: &Value) -> &Self {
        self.push_stdout(&value.to_string())
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CliRunner for ScriptedRunner {
    async fn run(
        &self,
        args: &[String],
        _options: &RunOptions,
        _token: &CancellationToken,
    ) -> ProcessResult {
        self.calls.lock().unwrap().push(args.to_vec());
        self.responses.lock().unwrap().pop_front().unwrap_or_else(|| {
            ProcessResult::new(
                String::new(),
                format!("unexpected call: cf {}", args.join(" ")),
                None,
                1,
            )
        })
    }
}

/// Answers `cf curl` calls by path, each after its own delay
///
/// Unlike [`ScriptedRunner`], answers do not depend on call order, so
/// concurrent lookups can settle at different times. The first route whose
/// prefix matches the path wins.
#[derive(Default)]
pub struct RoutedRunner {
    routes: Mutex<Vec<(String, Duration, String)>>,
}

impl RoutedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, prefix: &str, delay: Duration, body: &Value) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .push((prefix.to_string(), delay, body.to_string()));
        self
    }
}

#[async_trait]
impl CliRunner for RoutedRunner {
    async fn run(
        &self,
        args: &[String],
        _options: &RunOptions,
        _token: &CancellationToken,
    ) -> ProcessResult {
        let path = args.get(1).map(String::as_str).unwrap_or_default();
        let answer = self
            .routes
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _, _)| path.starts_with(prefix.as_str()))
            .map(|(_, delay, body)| (*delay, body.clone()));

        match answer {
            Some((delay, body)) => {
                tokio::time::sleep(delay).await;
                ProcessResult::new(body, String::new(), None, 0)
            },
            None => ProcessResult::new(
                String::new(),
                format!("unexpected call: cf {}", args.join(" ")),
                None,
                1,
            ),
        }
    }
}

/// `cf` home whose configuration targets `space_guid`, if any
pub fn cf_home(space_guid: Option<&str>) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    if let Some(guid) = space_guid {
        let cf_dir = dir.path().join(".cf");
        std::fs::create_dir_all(&cf_dir).unwrap();
        let config = serde_json::json!({
            "Target": "https://api.cf.example.com",
            "SpaceFields": {"GUID": guid, "Name": "dev"},
            "OrganizationFields": {"GUID": "org-1", "Name": "my-org"}
        });
        std::fs::write(cf_dir.join("config.json"), config.to_string()).unwrap();
    }
    dir
}

/// Client over a scripted runner; keep the `TempDir` alive for the test
pub fn scripted_client(space_guid: Option<&str>) -> (CfClient, Arc<ScriptedRunner>, TempDir) {
    let runner = Arc::new(ScriptedRunner::new());
    let home = cf_home(space_guid);
    let client = CfClient::new(
        runner.clone(),
        CfConfig::new(home.path().to_path_buf(), None),
    );
    (client, runner, home)
}

/// One page of a v3 list answer
pub fn page(resources: Value, next: Option<&str>) -> Value {
    serde_json::json!({
        "pagination": {
            "total_results": resources.as_array().map(|r| r.len()).unwrap_or(0),
            "next": next.map(|href| serde_json::json!({"href": href})),
        },
        "resources": resources,
    })
}

/// Client over a routed runner; keep the `TempDir` alive for the test
pub fn routed_client(space_guid: Option<&str>) -> (CfClient, Arc<RoutedRunner>, TempDir) {
    let runner = Arc::new(RoutedRunner::new());
    let home = cf_home(space_guid);
    let client = CfClient::new(
        runner.clone(),
        CfConfig::new(home.path().to_path_buf(), None),
    );
    (client, runner, home)
}
