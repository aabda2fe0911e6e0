use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use crate::project;

/// A request to execute tests, as issued by a viewer.
///
/// Ordered collections keep argument construction deterministic; an option
/// set to `false` never contributes anything to the command line.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunRequest {
    pub filters: BTreeSet<String>,
    pub group: String,
    pub suites: BTreeSet<String>,
    pub options: BTreeMap<String, bool>,
}

/// Incremental output from the runner process.
#[derive(Debug)]
pub enum RunnerEvent {
    Stdout(String),
    Stderr(String),
}

/// Guard that kills the child process (and its entire process group) on drop.
struct ChildGuard {
    child: Option<tokio::process::Child>,
    /// Process group ID saved at spawn time so we can kill the whole group.
    #[cfg(unix)]
    pgid: Option<u32>,
}

impl ChildGuard {
    fn new(child: tokio::process::Child) -> Self {
        #[cfg(unix)]
        let pgid = child.id();
        Self {
            child: Some(child),
            #[cfg(unix)]
            pgid,
        }
    }

    fn kill_group(&mut self) {
        // Take out the whole group so phpunit's own forks don't become orphans.
        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            unsafe { libc::kill(-(pgid as libc::pid_t), libc::SIGKILL) };
        }
        // Fallback / non-Unix: kill just the direct child.
        if let Some(ref mut child) = self.child {
            let _ = child.start_kill();
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.kill_group();
    }
}

/// Handle to a running test process.
///
/// Returned synchronously by [`PhpunitRunner::run`]; completion is observed
/// by draining [`ProcessHandle::next_event`] and then awaiting
/// [`ProcessHandle::wait`]. There is no implicit timeout — a caller wanting
/// one schedules it itself and calls [`ProcessHandle::kill`].
pub struct ProcessHandle {
    events: mpsc::UnboundedReceiver<RunnerEvent>,
    guard: ChildGuard,
}

impl ProcessHandle {
    /// Next stdout/stderr line; `None` once both streams reached EOF.
    pub async fn next_event(&mut self) -> Option<RunnerEvent> {
        self.events.recv().await
    }

    /// Wait for the process to exit and return its status.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        match self.guard.child.as_mut() {
            Some(child) => child.wait().await.context("failed to wait for test runner"),
            None => anyhow::bail!("test runner already reaped"),
        }
    }

    /// Caller-driven cancellation: kill the process group immediately.
    pub fn kill(&mut self) {
        self.guard.kill_group();
    }
}

/// Spawns the project's phpunit executable with explicitly constructed
/// argument vectors.
pub struct PhpunitRunner {
    project_root: PathBuf,
    binary: PathBuf,
}

impl PhpunitRunner {
    pub fn new(project_root: PathBuf) -> Self {
        let binary = project::runner_binary(&project_root);
        Self {
            project_root,
            binary,
        }
    }

    /// Override the resolved executable (configuration escape hatch).
    pub fn with_binary(project_root: PathBuf, binary: PathBuf) -> Self {
        Self {
            project_root,
            binary,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Spawn a test run writing its JUnit log to `log_path`.
    ///
    /// Returns the handle without blocking on completion; a spawn failure
    /// (missing executable, permission denied) propagates to the caller.
    pub fn run(&self, log_path: &Path, request: &RunRequest) -> Result<ProcessHandle> {
        let args = build_args(log_path, request);
        debug!(binary = %self.binary.display(), ?args, "spawning test runner");

        let mut cmd = Command::new(&self.binary);
        cmd.args(&args)
            .current_dir(&self.project_root)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        // Put the child in its own process group so killing it also takes
        // out any workers it forks.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.as_std_mut().process_group(0);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.binary.display()))?;

        let stdout = child.stdout.take().context("missing stdout")?;
        let stderr = child.stderr.take().context("missing stderr")?;

        let (tx, events) = mpsc::unbounded_channel();

        let tx_out = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx_out.send(RunnerEvent::Stdout(line)).is_err() {
                    break;
                }
            }
        });
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(RunnerEvent::Stderr(line)).is_err() {
                    break;
                }
            }
        });

        Ok(ProcessHandle {
            events,
            guard: ChildGuard::new(child),
        })
    }
}

/// Build the phpunit argument vector for a run request.
///
/// Every caller-supplied filter is regex-escaped individually before being
/// joined into one alternation, and the result is passed as a discrete
/// argument — never interpolated into a shell string.
pub fn build_args(log_path: &Path, request: &RunRequest) -> Vec<String> {
    let mut args = vec![
        "--log-junit".to_string(),
        log_path.to_string_lossy().into_owned(),
    ];

    for suite in &request.suites {
        args.push("--testsuite".to_string());
        args.push(suite.clone());
    }

    if !request.filters.is_empty() {
        let alternation: Vec<String> =
            request.filters.iter().map(|f| regex::escape(f)).collect();
        args.push("--filter".to_string());
        args.push(alternation.join("|"));
    }

    if !request.group.is_empty() {
        args.push("--group".to_string());
        args.push(request.group.clone());
    }

    for (option, enabled) in &request.options {
        if *enabled {
            args.push(format!("--{}", camel_to_kebab(option)));
        }
    }

    args
}

fn camel_to_kebab(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
