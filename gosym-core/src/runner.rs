//! Process runner: executes external discovery commands and captures stdout.

use crate::GoSymError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// A program plus its arguments. No shell is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
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
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Per-call execution options
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl RunOptions {
    pub fn new(timeout: Duration) -> Self {
        Self { cwd: None, timeout }
    }

    pub fn in_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// Runs external commands. No retries; the caller decides how to degrade.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `invocation` and return its stdout.
    ///
    /// Fails with `Execution` on non-zero exit (carrying stderr), `Spawn` if
    /// the program could not start and `Timeout` if it outlived the deadline.
    async fn run(&self, invocation: &Invocation, options: &RunOptions) -> crate::Result<String>;
}

/// `CommandRunner` backed by `tokio::process`
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation, options: &RunOptions) -> crate::Result<String> {
        let command = invocation.to_string();
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }

        let child = cmd.spawn().map_err(|source| GoSymError::Spawn {
            command: command.clone(),
            source,
        })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(options.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(GoSymError::Timeout {
                    command,
                    timeout: options.timeout,
                })
            }
        };

        if !output.status.success() {
            return Err(GoSymError::Execution {
                command,
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!(command = %command, bytes = output.stdout.len(), "command finished");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> RunOptions {
        RunOptions::new(Duration::from_secs(10))
    }

    #[test]
    fn test_invocation_display() {
        let inv = Invocation::new("go").args(["list", "-m", "all"]);
        assert_eq!(inv.to_string(), "go list -m all");
        assert_eq!(Invocation::new("go").to_string(), "go");
    }

    #[tokio::test]
    async fn test_captures_stdout() {
        let inv = Invocation::new("sh").args(["-c", "echo hello"]);
        let out = ProcessRunner.run(&inv, &opts()).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn test_respects_working_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let inv = Invocation::new("sh").args(["-c", "ls"]);
        let out = ProcessRunner
            .run(&inv, &opts().in_dir(dir.path()))
            .await
            .unwrap();
        assert!(out.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr() {
        let inv = Invocation::new("sh").args(["-c", "echo broken >&2; exit 3"]);
        let err = ProcessRunner.run(&inv, &opts()).await.unwrap_err();
        match err {
            GoSymError::Execution { status, stderr, .. } => {
                assert_eq!(status, Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let inv = Invocation::new("gosym-definitely-not-installed");
        let err = ProcessRunner.run(&inv, &opts()).await.unwrap_err();
        assert!(matches!(err, GoSymError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let inv = Invocation::new("sleep").arg("5");
        let err = ProcessRunner
            .run(&inv, &RunOptions::new(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, GoSymError::Timeout { .. }));
    }
}
