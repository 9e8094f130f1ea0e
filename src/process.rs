//! External process execution with streamed output.
//!
//! Every container engine and CLI call goes through a [`CommandRunner`], so
//! tests can substitute a fake that never spawns anything.

use crate::constants::DEFAULT_OUTPUT_TAIL_LINES;
use crate::error::{PackagingError, Result};
use crate::progress::ProgressReporter;
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// A fully described external invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Short tool name used in error messages (`docker`, `pack`, ...)
    pub tool: String,
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
    /// Keep all of stdout instead of only the tail
    pub capture_stdout: bool,
}

impl CommandSpec {
    pub fn new(tool: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn capture_stdout(mut self) -> Self {
        self.capture_stdout = true;
        self
    }

    /// Value following `flag`, e.g. `value_of("--platform")`.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Every value following repeated `flag`s, in order.
    pub fn values_of(&self, flag: &str) -> Vec<&str> {
        self.args
            .windows(2)
            .filter(|w| w[0] == flag)
            .map(|w| w[1].as_str())
            .collect()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Full stdout when `capture_stdout` was requested, empty otherwise
    pub stdout: String,
    /// Last lines of interleaved stdout/stderr
    pub tail: String,
}

/// Bounded ring of the most recent output lines
#[derive(Debug)]
pub struct OutputTail {
    lines: VecDeque<String>,
    limit: usize,
}

impl OutputTail {
    pub fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(limit.min(1024)),
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, line: &str) {
        if self.lines.len() == self.limit {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    pub fn render(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. A non-zero exit is returned as `PackagingError::ExternalTool`.
    async fn run(
        &self,
        spec: &CommandSpec,
        workload: &str,
        reporter: &dyn ProgressReporter,
    ) -> Result<CommandOutput>;
}

/// Runs commands as real child processes via `tokio::process`.
pub struct ProcessRunner {
    tail_lines: usize,
}

impl ProcessRunner {
    pub fn new(tail_lines: usize) -> Self {
        Self { tail_lines }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_TAIL_LINES)
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        workload: &str,
        reporter: &dyn ProgressReporter,
    ) -> Result<CommandOutput> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        tracing::debug!(tool = %spec.tool, command = %spec, "spawning process");

        let mut child = command.spawn().map_err(|e| PackagingError::ExternalTool {
            tool: spec.tool.clone(),
            command: spec.to_string(),
            exit_code: None,
            output: format!("failed to start {}: {}", spec.program, e),
        })?;

        let (mut stdout, mut stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(o), Some(e)) => (BufReader::new(o), BufReader::new(e)),
            _ => {
                return Err(PackagingError::ExternalTool {
                    tool: spec.tool.clone(),
                    command: spec.to_string(),
                    exit_code: None,
                    output: "child process pipes unavailable".to_string(),
                })
            }
        };

        let mut tail = OutputTail::new(self.tail_lines);
        let mut captured = String::new();
        let (mut out_buf, mut err_buf) = (Vec::new(), Vec::new());
        let (mut out_done, mut err_done) = (false, false);
        let io_err = |e: std::io::Error| PackagingError::io(&spec.program, e);

        // Bytes from a read interrupted by the other branch stay in the buffer
        // and are completed by the next call.
        while !(out_done && err_done) {
            tokio::select! {
                read = stdout.read_until(b'\n', &mut out_buf), if !out_done => {
                    let read = read.map_err(io_err)?;
                    if !out_buf.is_empty() {
                        let line = decode_line(&out_buf);
                        out_buf.clear();
                        reporter.on_output(workload, &line);
                        if spec.capture_stdout {
                            captured.push_str(&line);
                            captured.push('\n');
                        }
                        tail.push(&line);
                    }
                    out_done = read == 0;
                },
                read = stderr.read_until(b'\n', &mut err_buf), if !err_done => {
                    let read = read.map_err(io_err)?;
                    if !err_buf.is_empty() {
                        let line = decode_line(&err_buf);
                        err_buf.clear();
                        reporter.on_output(workload, &line);
                        tail.push(&line);
                    }
                    err_done = read == 0;
                },
            }
        }

        let status = child.wait().await.map_err(io_err)?;
        if !status.success() {
            return Err(PackagingError::ExternalTool {
                tool: spec.tool.clone(),
                command: spec.to_string(),
                exit_code: status.code(),
                output: tail.render(),
            });
        }

        Ok(CommandOutput {
            stdout: captured,
            tail: tail.render(),
        })
    }
}

/// One output line without its terminator. Tools may print in any locale,
/// so invalid UTF-8 is replaced rather than rejected.
fn decode_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}
