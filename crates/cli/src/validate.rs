// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared input validation for task ids, filesystem paths, and PTY geometry.

use regex::Regex;

use crate::error::ApiError;

pub const MAX_PATH_LEN: usize = 4096;

/// `^[A-Za-z0-9._-]{1,128}$` — the required `taskId` key format. Compiled
/// per call: validation runs once per session/request, not per byte, so
/// there's no cache to maintain.
pub fn task_id(id: &str) -> Result<(), ApiError> {
    let pattern = Regex::new(r"^[A-Za-z0-9._-]{1,128}$")
        .map_err(|e| ApiError::Internal(format!("task id pattern failed to compile: {e}")))?;
    if pattern.is_match(id) {
        Ok(())
    } else {
        Err(ApiError::Validation(format!("invalid taskId: {id}")))
    }
}

/// Requires an absolute path of at most `MAX_PATH_LEN` characters.
pub fn absolute_path(raw: &str) -> Result<std::path::PathBuf, ApiError> {
    if raw.len() > MAX_PATH_LEN {
        return Err(ApiError::Validation("path exceeds maximum length".to_string()));
    }
    let path = std::path::PathBuf::from(raw);
    if !path.is_absolute() {
        return Err(ApiError::Validation("path must be absolute".to_string()));
    }
    Ok(path)
}

/// Clamps PTY geometry to cols in [20,1000], rows in [10,1000].
pub fn pty_geometry(cols: u16, rows: u16) -> Result<(u16, u16), ApiError> {
    if !(20..=1000).contains(&cols) {
        return Err(ApiError::Validation(format!("cols out of range [20,1000]: {cols}")));
    }
    if !(10..=1000).contains(&rows) {
        return Err(ApiError::Validation(format!("rows out of range [10,1000]: {rows}")));
    }
    Ok((cols, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_task_ids() {
        assert!(task_id("fix-login-bug_2").is_ok());
        assert!(task_id("a.b.c").is_ok());
    }

    #[test]
    fn rejects_task_ids_with_illegal_characters() {
        assert!(task_id("has spaces").is_err());
        assert!(task_id("slash/es").is_err());
        assert!(task_id("").is_err());
    }

    #[test]
    fn rejects_oversized_task_ids() {
        let long = "a".repeat(129);
        assert!(task_id(&long).is_err());
    }

    #[test]
    fn rejects_relative_paths() {
        assert!(absolute_path("relative/path").is_err());
    }

    #[test]
    fn accepts_absolute_paths_within_length() {
        assert!(absolute_path("/tmp/foo").is_ok());
    }

    #[test]
    fn clamps_geometry_bounds() {
        assert!(pty_geometry(19, 24).is_err());
        assert!(pty_geometry(80, 9).is_err());
        assert!(pty_geometry(80, 24).is_ok());
        assert!(pty_geometry(1000, 1000).is_ok());
    }
}
