//! External command execution.
//!
//! Every interaction with the observatory software goes through an external
//! program: the keyword tools (`show`, `modify`), the channel tools (`caget`,
//! `caput`) and the instrument scripts (`lamp`, `iitime`, `igoi`, ...). The
//! `CommandRunner` trait is the one seam between the sequencer and those
//! programs, so tests can substitute a scripted runner for the real system.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{AppResult, PcuError};

/// Captured result of one external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
    /// Trimmed standard output.
    pub stdout: String,
    /// Trimmed standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output carrying `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and message.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// True when the command exited with status 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into `PcuError::CommandFailed`.
    pub fn check(self, program: &str) -> AppResult<Self> {
        if self.success() {
            return Ok(self);
        }
        let status = match self.code {
            Some(code) => format!("exit status {}", code),
            None => "signal".to_string(),
        };
        Err(PcuError::CommandFailed {
            program: program.to_string(),
            status,
            stderr: self.stderr,
        })
    }
}

/// Runs external programs to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and wait for it to exit.
    ///
    /// Only spawn failures are errors here; the exit status is reported in the
    /// returned `CommandOutput` and checked by the caller where required.
    async fn run(&self, program: &str, args: &[String]) -> AppResult<CommandOutput>;

    /// Run and require a zero exit status.
    async fn run_checked(&self, program: &str, args: &[String]) -> AppResult<CommandOutput> {
        self.run(program, args).await?.check(program)
    }
}

/// Runs commands on the host with `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> AppResult<CommandOutput> {
        debug!(program, ?args, "Running external command");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Scripted runner for tests and dry runs.
///
/// Records every invocation as a single `program arg1 arg2` string and answers
/// from a queue of canned outputs. When the queue is empty it answers with a
/// successful, empty output.
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRunner {
    /// Runner with no queued responses
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the output for the next unanswered call.
    pub fn push_response(&self, output: CommandOutput) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(output);
        }
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String]) -> AppResult<CommandOutput> {
        let mut line = program.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(line);
        }

        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        Ok(next.unwrap_or_else(|| CommandOutput::ok("")))
    }
}

/// Build an owned argument vector from string slices.
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}
