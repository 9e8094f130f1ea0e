#![allow(dead_code)]

use async_trait::async_trait;
use packsmith::error::PackagingError;
use packsmith::process::{CommandOutput, CommandRunner, CommandSpec};
use packsmith::progress::{NoopReporter, ProgressReporter};
use packsmith::{EngineConfig, Packager};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const IMAGE_SIZE: u64 = 4096;

type Hook = dyn Fn(&CommandSpec) -> packsmith::Result<CommandOutput> + Send + Sync;

/// Fake runner: records every command and answers through a hook.
/// Generated Dockerfiles are read while the command "runs", since they are
/// deleted as soon as it returns.
pub struct RecordingRunner {
    calls: Mutex<Vec<CommandSpec>>,
    dockerfiles: Mutex<Vec<String>>,
    hook: Box<Hook>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::with_hook(default_reply)
    }

    pub fn with_hook<F>(hook: F) -> Self
    where
        F: Fn(&CommandSpec) -> packsmith::Result<CommandOutput> + Send + Sync + 'static,
    {
        Self {
            calls: Mutex::new(Vec::new()),
            dockerfiles: Mutex::new(Vec::new()),
            hook: Box::new(hook),
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, tool: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|c| c.tool == tool)
            .collect()
    }

    pub fn builds(&self) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|c| c.args.first().map(String::as_str) == Some("build"))
            .collect()
    }

    pub fn dockerfiles(&self) -> Vec<String> {
        self.dockerfiles.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        _workload: &str,
        _reporter: &dyn ProgressReporter,
    ) -> packsmith::Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        if let Some(path) = spec.value_of("-f") {
            if let Ok(content) = fs::read_to_string(path) {
                self.dockerfiles.lock().unwrap().push(content);
            }
        }
        (self.hook)(spec)
    }
}

/// `image inspect` answers with a fixed image; everything else succeeds silently.
pub fn default_reply(spec: &CommandSpec) -> packsmith::Result<CommandOutput> {
    if spec.args.iter().any(|a| a == "inspect") {
        return Ok(CommandOutput {
            stdout: format!(r#"{{"Id":"sha256:feedface","Size":{}}}"#, IMAGE_SIZE),
            tail: String::new(),
        });
    }
    Ok(CommandOutput::default())
}

pub fn tool_failure(spec: &CommandSpec, output: &str) -> PackagingError {
    PackagingError::ExternalTool {
        tool: spec.tool.clone(),
        command: spec.to_string(),
        exit_code: Some(1),
        output: output.to_string(),
    }
}

pub fn test_config(root: &Path) -> EngineConfig {
    EngineConfig {
        work_dir: root.join("work"),
        output_dir: root.join("out"),
        ..EngineConfig::default()
    }
}

pub fn packager(root: &Path, runner: Arc<RecordingRunner>) -> Packager {
    Packager::new(test_config(root))
        .with_runner(runner)
        .with_reporter(Arc::new(NoopReporter))
}

pub fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

/// Entries left in a directory, or none if it does not exist.
pub fn entries(dir: &Path) -> Vec<String> {
    match fs::read_dir(dir) {
        Ok(read) => read
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect(),
        Err(_) => Vec::new(),
    }
}
