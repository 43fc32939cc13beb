// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer token resolution and constant-time comparison, shared by the
//! Control Daemon and the Approval Gateway.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use base64::Engine as _;
use rand::RngCore;

/// Where the resolved token came from, printed on startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Env,
    File,
    Generated,
}

impl TokenSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenSource::Env => "env",
            TokenSource::File => "file",
            TokenSource::Generated => "generated",
        }
    }
}

/// Resolves the bearer token: explicit override, then the token file, then
/// generate-and-persist.
///
/// Resolution order matches the external interface contract: `token_env`
/// wins outright; otherwise the file is read if present, otherwise 32
/// random bytes are generated, base64url-encoded, and persisted atomically
/// before being returned.
pub fn resolve(token_env: Option<&str>, token_file: &Path) -> std::io::Result<(String, TokenSource)> {
    if let Some(t) = token_env {
        return Ok((t.to_string(), TokenSource::Env));
    }

    if let Ok(existing) = fs::read_to_string(token_file) {
        let trimmed = existing.trim().to_string();
        if !trimmed.is_empty() {
            return Ok((trimmed, TokenSource::File));
        }
    }

    let token = generate();
    persist(token_file, &token)?;
    Ok((token, TokenSource::Generated))
}

/// Generates a fresh 32-byte random token, base64url-encoded without padding.
fn generate() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Writes the token atomically: `.tmp` sibling, fsync, rename, then
/// tighten permissions. Parent directory is created 0700 first.
fn persist(path: &Path, token: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
        fs::set_permissions(parent, fs::Permissions::from_mode(0o700))?;
    }

    let tmp_path = path.with_extension("tmp");
    {
        use std::io::Write;
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(token.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Constant-time comparison of two ASCII/UTF-8 byte strings. Avoids
/// timing side-channels that a short-circuiting `==` would leak.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn constant_time_eq_matches_equal_strings() {
        assert!(constant_time_eq(b"abc123", b"abc123"));
    }

    #[test]
    fn constant_time_eq_rejects_mismatched_length() {
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    #[test]
    fn constant_time_eq_rejects_differing_content() {
        assert!(!constant_time_eq(b"abc123", b"abc124"));
    }

    #[test]
    fn env_override_wins_outright() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("core.token");
        let (token, source) = resolve(Some("explicit-token"), &path).unwrap();
        assert_eq!(token, "explicit-token");
        assert_eq!(source, TokenSource::Env);
        assert!(!path.exists());
    }

    #[test]
    fn generates_and_persists_with_restrictive_permissions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("core.token");
        let (token, source) = resolve(None, &path).unwrap();
        assert_eq!(source, TokenSource::Generated);
        assert!(!token.is_empty());

        let meta = fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);

        let parent_meta = fs::metadata(path.parent().unwrap()).unwrap();
        assert_eq!(parent_meta.permissions().mode() & 0o777, 0o700);
    }

    #[test]
    fn reads_back_persisted_token_on_second_resolve() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("core.token");
        let (first, _) = resolve(None, &path).unwrap();
        let (second, source) = resolve(None, &path).unwrap();
        assert_eq!(first, second);
        assert_eq!(source, TokenSource::File);
    }
}
