// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worktree Manager: gives every task an isolated git checkout without
//! corrupting the user's primary working copy.

pub mod git;

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;

use git::{Git, GitError};

/// Collapses a raw task name to `[a-z0-9._-]`, trims separators, and
/// collapses runs of `-`. Rejected (returns `None`) if empty after
/// sanitization — callers synthesize a `task-<short>` fallback. Patterns
/// are compiled per call; this runs once per worktree operation, not per
/// byte, so there's no cache worth maintaining.
pub fn sanitize_task_name(raw: &str) -> Option<String> {
    let non_allowed = Regex::new(r"[^a-z0-9._-]+").ok()?;
    let runs_of_dash = Regex::new(r"-{2,}").ok()?;

    let lowered = raw.to_lowercase();
    let replaced = non_allowed.replace_all(&lowered, "-");
    let collapsed = runs_of_dash.replace_all(&replaced, "-");
    let trimmed = collapsed.trim_matches(|c| c == '-' || c == '.' || c == '_');

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// `<parent(basePath)>/<basename(basePath)>-worktrees`, the fixed
/// sibling-directory layout every `worktreePath` lives under.
pub fn worktrees_root(base_path: &Path) -> PathBuf {
    let parent = base_path.parent().unwrap_or_else(|| Path::new("/"));
    let base_name = base_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    parent.join(format!("{base_name}-worktrees"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Git,
    Plain,
    Missing,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateSourceResult {
    pub valid: bool,
    pub is_repo: bool,
    #[serde(rename = "type")]
    pub source_type: SourceType,
}

/// Pure validation: checks `path` exists, is a directory, and probes for a
/// repository. No mutation.
pub async fn validate_source(path: &Path) -> ValidateSourceResult {
    if !path.is_dir() {
        return ValidateSourceResult { valid: false, is_repo: false, source_type: SourceType::Missing };
    }
    let is_repo = path.join(".git").exists();
    ValidateSourceResult {
        valid: true,
        is_repo,
        source_type: if is_repo { SourceType::Git } else { SourceType::Plain },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneMode {
    CopyOnWrite,
    Skip,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyBootstrap {
    pub attempted: bool,
    pub method: &'static str,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorktreeResult {
    pub success: bool,
    pub worktree_path: String,
    pub branch: String,
    pub dependency_bootstrap: Option<DependencyBootstrap>,
    pub error: Option<String>,
}

/// `createWorktree(basePath, taskName, baseBranch?, options)`.
///
/// Initializes `basePath` as a repo (with an initial commit) if it isn't
/// one already. Attaches to an existing branch of `taskName` if present,
/// otherwise creates it from `baseBranch` (or current HEAD) in one
/// `worktree add -b` step.
pub async fn create_worktree(
    base_path: &Path,
    task_name: &str,
    base_branch: Option<&str>,
    dependency_clone: Option<(CloneMode, &Path)>,
    worktrees_root_override: Option<&Path>,
) -> CreateWorktreeResult {
    let sanitized = match sanitize_task_name(task_name) {
        Some(s) => s,
        None => {
            return failed("invalid task name after sanitization".to_string());
        }
    };

    let git = Git::new(base_path);

    if !base_path.join(".git").exists() {
        if let Err(e) = ensure_repo_initialized(&git).await {
            return failed(e.to_string());
        }
    }

    let worktrees_dir = worktrees_root_override.map(Path::to_path_buf).unwrap_or_else(|| worktrees_root(base_path));
    if let Err(e) = tokio::fs::create_dir_all(&worktrees_dir).await {
        return failed(format!("failed to create worktrees root: {e}"));
    }

    let worktree_path = worktrees_dir.join(&sanitized);
    if worktree_path.exists() && !is_registered_worktree(&git, &worktree_path).await {
        return failed(format!(
            "{} already exists and is not a managed worktree",
            worktree_path.display()
        ));
    }

    let branch_exists = branch_exists(&git, &sanitized).await;
    let add_result = if branch_exists {
        git.run(&["worktree", "add", &worktree_path.to_string_lossy(), &sanitized]).await
    } else {
        let start_point = base_branch.map(str::to_string).unwrap_or_else(|| "HEAD".to_string());
        git.run(&[
            "worktree",
            "add",
            "-b",
            &sanitized,
            &worktree_path.to_string_lossy(),
            &start_point,
        ])
        .await
    };

    if let Err(e) = add_result {
        return failed(e.to_string());
    }

    let dependency_bootstrap = match dependency_clone {
        Some((CloneMode::CopyOnWrite, source)) => Some(bootstrap_dependencies(source, &worktree_path).await),
        _ => None,
    };

    CreateWorktreeResult {
        success: true,
        worktree_path: worktree_path.to_string_lossy().to_string(),
        branch: sanitized,
        dependency_bootstrap,
        error: None,
    }
}

fn failed(error: String) -> CreateWorktreeResult {
    CreateWorktreeResult {
        success: false,
        worktree_path: String::new(),
        branch: String::new(),
        dependency_bootstrap: None,
        error: Some(error),
    }
}

/// Initializes an empty `basePath` as a repository with an initial commit,
/// tolerating "nothing to commit" (an already-populated directory with no
/// staged changes after `git add -A`).
async fn ensure_repo_initialized(git: &Git) -> Result<(), GitError> {
    git.run(&["init"]).await?;
    git.run(&["add", "-A"]).await?;
    match git.run(&["commit", "-m", "initial commit", "--allow-empty-message", "--no-verify"]).await {
        Ok(_) => Ok(()),
        Err(GitError::CommandFailed { ref stderr, .. }) if stderr.contains("nothing to commit") => Ok(()),
        Err(e) => Err(e),
    }
}

async fn branch_exists(git: &Git, branch: &str) -> bool {
    git.run(&["show-ref", "--verify", "--quiet", &format!("refs/heads/{branch}")]).await.is_ok()
}

async fn is_registered_worktree(git: &Git, path: &Path) -> bool {
    let Ok(output) = git.run(&["worktree", "list", "--porcelain"]).await else {
        return false;
    };
    let target = path.to_string_lossy();
    output.lines().iter().any(|l| l.strip_prefix("worktree ").is_some_and(|p| p == target))
}

/// Best-effort dependency bootstrap: try a reflink-style hard link of the
/// source tree into the new worktree, falling back to a recursive copy.
/// Off by default (see DESIGN.md Open Question 3) — no package-ecosystem
/// store location is configurable yet.
async fn bootstrap_dependencies(source: &Path, dest: &Path) -> DependencyBootstrap {
    match copy_tree_hardlink(source, dest).await {
        Ok(()) => DependencyBootstrap { attempted: true, method: "hardlink", error: None },
        Err(hardlink_err) => match copy_tree_recursive(source, dest).await {
            Ok(()) => DependencyBootstrap { attempted: true, method: "copy", error: None },
            Err(copy_err) => DependencyBootstrap {
                attempted: true,
                method: "none",
                error: Some(format!("{hardlink_err}; {copy_err}")),
            },
        },
    }
}

async fn copy_tree_hardlink(source: &Path, dest: &Path) -> std::io::Result<()> {
    let source = source.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || hardlink_dir(&source, &dest))
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?
}

fn hardlink_dir(source: &Path, dest: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
            hardlink_dir(&entry.path(), &target)?;
        } else if file_type.is_file() {
            std::fs::hard_link(entry.path(), &target)?;
        }
    }
    Ok(())
}

async fn copy_tree_recursive(source: &Path, dest: &Path) -> std::io::Result<()> {
    let source = source.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || copy_dir(&source, &dest))
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?
}

fn copy_dir(source: &Path, dest: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct WorktreeInfo {
    pub path: String,
    pub head: String,
    pub branch: Option<String>,
}

pub async fn list_worktrees(base_path: &Path) -> Result<Vec<WorktreeInfo>, GitError> {
    let git = Git::new(base_path);
    let output = git.run(&["worktree", "list", "--porcelain"]).await?;

    let mut worktrees = Vec::new();
    let mut path = String::new();
    let mut head = String::new();
    let mut branch = None;

    for line in output.lines() {
        if let Some(p) = line.strip_prefix("worktree ") {
            if !path.is_empty() {
                worktrees.push(WorktreeInfo { path, head: head.clone(), branch: branch.take() });
            }
            path = p.to_string();
            head.clear();
        } else if let Some(h) = line.strip_prefix("HEAD ") {
            head = h.to_string();
        } else if let Some(b) = line.strip_prefix("branch refs/heads/") {
            branch = Some(b.to_string());
        }
    }
    if !path.is_empty() {
        worktrees.push(WorktreeInfo { path, head, branch });
    }
    Ok(worktrees)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchInfo {
    pub name: String,
    pub is_current: bool,
}

pub async fn list_branches(base_path: &Path) -> Result<Vec<BranchInfo>, GitError> {
    let git = Git::new(base_path);
    let output = git.run(&["branch", "--no-color", "--format=%(HEAD)|%(refname:short)"]).await?;

    let mut branches = Vec::new();
    for line in output.lines() {
        let mut parts = line.splitn(2, '|');
        let is_current = parts.next().is_some_and(|p| p.trim() == "*");
        if let Some(name) = parts.next() {
            branches.push(BranchInfo { name: name.trim().to_string(), is_current });
        }
    }
    Ok(branches)
}

#[derive(Debug, Clone, Serialize)]
pub struct OpResult {
    pub success: bool,
    pub error: Option<String>,
}

/// `removeWorktree`. Idempotent on an already-absent worktree/branch.
pub async fn remove_worktree(base_path: &Path, task_name: &str, worktree_path: &Path, force: bool) -> OpResult {
    let git = Git::new(base_path);
    let path_str = worktree_path.to_string_lossy().to_string();

    if worktree_path.exists() {
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(&path_str);
        if let Err(e) = git.run(&args).await {
            if !matches!(e, GitError::CommandFailed { ref stderr, .. } if stderr.contains("is not a working tree"))
            {
                return OpResult { success: false, error: Some(e.to_string()) };
            }
        }
    }

    let Some(branch) = sanitize_task_name(task_name) else {
        return OpResult { success: true, error: None };
    };
    match git.run(&["branch", "-D", &branch]).await {
        Ok(_) => OpResult { success: true, error: None },
        Err(GitError::CommandFailed { ref stderr, .. }) if stderr.contains("not found") => {
            OpResult { success: true, error: None }
        }
        Err(e) => OpResult { success: false, error: Some(e.to_string()) },
    }
}

/// `mergeWorktree`. Commits any uncommitted changes in the worktree with an
/// automated message, merges the task branch into the currently checked-out
/// base branch, then removes the worktree and deletes the branch.
pub async fn merge_worktree(base_path: &Path, task_name: &str, worktree_path: &Path) -> OpResult {
    let Some(branch) = sanitize_task_name(task_name) else {
        return OpResult { success: false, error: Some("invalid task name".to_string()) };
    };

    let worktree_git = Git::new(worktree_path);
    match worktree_git.run(&["status", "--porcelain"]).await {
        Ok(status) if !status.trimmed().is_empty() => {
            if let Err(e) = worktree_git.run(&["add", "-A"]).await {
                return OpResult { success: false, error: Some(e.to_string()) };
            }
            if let Err(e) = worktree_git
                .run(&["commit", "-m", &format!("automated: sync changes from {branch}")])
                .await
            {
                return OpResult { success: false, error: Some(e.to_string()) };
            }
        }
        Ok(_) => {}
        Err(e) => return OpResult { success: false, error: Some(e.to_string()) },
    }

    let base_git = Git::new(base_path);
    if let Err(e) = base_git.run(&["merge", "--no-edit", &branch]).await {
        return OpResult { success: false, error: Some(e.to_string()) };
    }

    remove_worktree(base_path, task_name, worktree_path, false).await
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffResult {
    pub diff: String,
}

/// `getDiff(worktreePath, {syntaxAware})`. Stages everything to produce a
/// comprehensive diff including untracked files, then unstages to preserve
/// the pre-existing index state. `syntaxAware` falls back to a textual diff
/// silently when no structural diff tool is available.
pub async fn get_diff(worktree_path: &Path, syntax_aware: bool) -> Result<DiffResult, GitError> {
    let git = Git::new(worktree_path);
    git.run(&["add", "-A"]).await?;

    let diff = if syntax_aware {
        match difftastic_diff(worktree_path).await {
            Some(d) => d,
            None => git.run(&["diff", "--cached"]).await?.stdout,
        }
    } else {
        git.run(&["diff", "--cached"]).await?.stdout
    };

    git.run(&["reset"]).await?;
    Ok(DiffResult { diff })
}

/// Attempts a structural diff via `difft` if present on `$PATH`, returning
/// `None` (silent fallback) when the tool is missing or fails.
async fn difftastic_diff(worktree_path: &Path) -> Option<String> {
    let output = tokio::process::Command::new("difft")
        .arg("--display=inline")
        .current_dir(worktree_path)
        .output()
        .await
        .ok()?;
    if output.status.success() {
        String::from_utf8(output.stdout).ok()
    } else {
        None
    }
}

/// `getModifiedFiles`. Empty list when the worktree is absent.
pub async fn get_modified_files(worktree_path: &Path) -> Vec<String> {
    if !worktree_path.is_dir() {
        return Vec::new();
    }
    let git = Git::new(worktree_path);
    match git.run(&["status", "--porcelain"]).await {
        Ok(output) => output
            .lines()
            .filter_map(|l| l.get(3..).map(|p| p.trim().to_string()))
            .filter(|p| !p.is_empty())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_task_name_to_lowercase_collapsed() {
        assert_eq!(sanitize_task_name("Fix Login Bug!!").as_deref(), Some("fix-login-bug"));
        assert_eq!(sanitize_task_name("already-ok_123").as_deref(), Some("already-ok_123"));
    }

    #[test]
    fn rejects_empty_after_sanitization() {
        assert_eq!(sanitize_task_name("!!!"), None);
        assert_eq!(sanitize_task_name(""), None);
    }

    #[test]
    fn worktrees_root_is_parent_sibling_directory() {
        let base = Path::new("/repos/myapp");
        assert_eq!(worktrees_root(base), Path::new("/repos/myapp-worktrees"));
    }

    #[tokio::test]
    async fn validate_source_reports_missing_path() {
        let result = validate_source(Path::new("/does/not/exist/at/all")).await;
        assert!(!result.valid);
        assert_eq!(result.source_type, SourceType::Missing);
    }

    #[tokio::test]
    async fn get_modified_files_on_absent_worktree_is_empty() {
        let files = get_modified_files(Path::new("/does/not/exist/at/all")).await;
        assert!(files.is_empty());
    }
}
