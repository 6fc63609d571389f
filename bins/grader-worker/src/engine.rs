/// Execution Engine - Local Process Execution
///
/// **Core Responsibility:**
/// Run one program invocation and capture its raw results.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to run a program (argv, stdin, working directory)
/// - Engine does NOT know what the output should be
/// - Engine does NOT score anything
/// - Engine returns raw outputs for the evaluator to judge
///
/// **Safety Guarantees:**
/// - Input validation: rejects oversized stdin before spawning
/// - Hard timeout: enforced via tokio::time::timeout
/// - Guaranteed cleanup: the child is killed when its future is dropped

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Guardrail against pathological test inputs
pub const MAX_STDIN_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// One program run: command line, input and limits
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub stdin: Option<String>,
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

impl Invocation {
    pub fn new(argv: Vec<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            argv,
            stdin: None,
            working_dir: working_dir.into(),
            timeout: Duration::from_millis(grader_common::config::DEFAULT_TIMEOUT_MS),
        }
    }

    pub fn stdin(mut self, stdin: Option<String>) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout = Duration::from_millis(timeout_ms);
        self
    }

    /// The command line as it would be typed into a POSIX shell
    pub fn command_line(&self) -> String {
        shell_join(&self.argv)
    }
}

/// Raw execution output for a single invocation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
    /// None when the program was killed by a signal or timed out
    pub exit_code: Option<i32>,
    pub execution_time_ms: u64,
    pub timed_out: bool,
}

impl ExecutionOutput {
    /// Killed by a signal, or exited with a non-zero code
    pub fn exited_abnormally(&self) -> bool {
        self.exit_code != Some(0)
    }

    /// Killed without ever reporting an exit code
    pub fn killed(&self) -> bool {
        !self.timed_out && self.exit_code.is_none()
    }
}

/// Runs programs as local child processes
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    max_stdin_bytes: usize,
}

impl Default for ProcessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessEngine {
    pub fn new() -> Self {
        Self::with_max_stdin_bytes(MAX_STDIN_BYTES)
    }

    pub fn with_max_stdin_bytes(max_stdin_bytes: usize) -> Self {
        Self { max_stdin_bytes }
    }

    /// Execute a program with hardened safety guarantees.
    ///
    /// An `Err` means the program could not be run at all (bad argv,
    /// missing binary, oversized input). Timeouts and crashes are reported
    /// through `ExecutionOutput`.
    #[tracing::instrument(skip(self, invocation), fields(program = ?invocation.argv.first(), timeout_ms = invocation.timeout.as_millis() as u64))]
    pub async fn execute(&self, invocation: &Invocation) -> Result<ExecutionOutput> {
        // GUARDRAIL: validate input sizes
        let input_len = invocation.stdin.as_ref().map_or(0, String::len);
        if input_len > self.max_stdin_bytes {
            bail!(
                "Test input exceeds maximum size of {} bytes",
                self.max_stdin_bytes
            );
        }
        let Some((program, args)) = invocation.argv.split_first() else {
            bail!("Cannot run an empty command line");
        };

        let mut child = Command::new(resolve_program(&invocation.working_dir, program))
            .args(args)
            .current_dir(&invocation.working_dir)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| {
                format!(
                    "Failed to start '{}' in {}",
                    invocation.command_line(),
                    invocation.working_dir.display()
                )
            })?;

        let start_time = Instant::now();

        // Feed stdin concurrently so a program that writes before reading cannot deadlock us
        let feeder = match (child.stdin.take(), invocation.stdin.clone()) {
            (Some(mut pipe), Some(input)) => Some(tokio::spawn(async move {
                if let Err(e) = pipe.write_all(input.as_bytes()).await {
                    debug!(error = %e, "Program closed stdin early");
                }
            })),
            _ => None,
        };

        // HARD TIMEOUT: dropping the wait future drops the child, which kills it
        let waited = tokio::time::timeout(invocation.timeout, child.wait_with_output()).await;
        if let Some(feeder) = feeder {
            feeder.abort();
        }
        let execution_time_ms = start_time.elapsed().as_millis() as u64;

        match waited {
            Ok(output) => {
                let output = output.context("Failed to collect program output")?;
                let exit_code = output.status.code();
                if exit_code.is_none() {
                    warn!(status = %output.status, "Program was killed by a signal");
                }
                debug!(?exit_code, execution_time_ms, "Program finished");
                Ok(ExecutionOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_code,
                    execution_time_ms,
                    timed_out: false,
                })
            }
            Err(_) => {
                warn!(execution_time_ms, "Execution timed out - program killed");
                Ok(ExecutionOutput {
                    execution_time_ms,
                    timed_out: true,
                    ..Default::default()
                })
            }
        }
    }
}

/// `./prog` is looked up in the working directory, not the worker's
fn resolve_program(working_dir: &Path, program: &str) -> PathBuf {
    if program.starts_with("./") || program.starts_with("../") {
        working_dir.join(program)
    } else {
        PathBuf::from(program)
    }
}

/// POSIX shell quoting, one word at a time
pub fn shell_join(argv: &[String]) -> String {
    argv.iter()
        .map(|word| shell_quote(word))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(word: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c);
    if !word.is_empty() && word.chars().all(safe) {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r#"'"'"'"#))
    }
}
