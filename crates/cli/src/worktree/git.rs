// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Low-level git command runner. Wraps `git`; never exposes raw shell to
//! callers above this module.

use std::fmt;
use std::path::PathBuf;

use tokio::process::Command;
use tokio::time::{timeout, Duration};

const GIT_TIMEOUT: Duration = Duration::from_secs(30);

/// All possible errors from git subprocess invocation. Hand-rolled rather
/// than `thiserror`-derived, matching the rest of this workspace, which
/// does not carry a `thiserror` dependency.
#[derive(Debug, Clone)]
pub enum GitError {
    GitNotFound,
    CommandFailed { code: i32, stderr: String, command: String },
    Timeout { command: String },
    SpawnError { message: String, command: String },
    InvalidUtf8,
}

impl fmt::Display for GitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitError::GitNotFound => write!(f, "git executable not found"),
            GitError::CommandFailed { code, stderr, command } => {
                write!(f, "`{command}` failed (exit {code}): {stderr}")
            }
            GitError::Timeout { command } => write!(f, "`{command}` timed out after 30s"),
            GitError::SpawnError { message, command } => write!(f, "failed to spawn `{command}`: {message}"),
            GitError::InvalidUtf8 => write!(f, "git produced invalid UTF-8 output"),
        }
    }
}

impl std::error::Error for GitError {}

impl serde::Serialize for GitError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Captured stdout/stderr from a completed git subprocess.
#[derive(Debug)]
pub struct GitOutput {
    pub stdout: String,
    #[allow(dead_code)]
    pub stderr: String,
}

impl GitOutput {
    pub fn lines(&self) -> Vec<&str> {
        self.stdout.lines().filter(|l| !l.is_empty()).collect()
    }

    pub fn trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// Git command runner bound to a repository path.
///
/// Every command runs via `git -C <repo>` with `GIT_TERMINAL_PROMPT=0`
/// (never hang on a credential prompt) and `LC_ALL=C` (parseable English
/// output), killed on drop and capped at 30s.
#[derive(Debug, Clone)]
pub struct Git {
    repo_path: PathBuf,
}

impl Git {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Git { repo_path: repo_path.into() }
    }

    pub async fn run(&self, args: &[&str]) -> Result<GitOutput, GitError> {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(&self.repo_path)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .kill_on_drop(true);

        let command_str = format!("git -C {} {}", self.repo_path.display(), args.join(" "));

        let output = timeout(GIT_TIMEOUT, cmd.output())
            .await
            .map_err(|_| GitError::Timeout { command: command_str.clone() })?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    GitError::GitNotFound
                } else {
                    GitError::SpawnError { message: e.to_string(), command: command_str.clone() }
                }
            })?;

        let stdout = String::from_utf8(output.stdout).map_err(|_| GitError::InvalidUtf8)?;
        let stderr = String::from_utf8(output.stderr).map_err(|_| GitError::InvalidUtf8)?;

        if output.status.success() {
            Ok(GitOutput { stdout, stderr })
        } else {
            Err(GitError::CommandFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
                command: command_str,
            })
        }
    }
}
