// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process configuration resolved from CLI flags and `FORKLINE_*`
//! environment variables.

use std::path::PathBuf;

use clap::Parser;

/// Daemon configuration. Every field is overridable via an environment
/// variable of the same purpose, following the `FORKLINE_CORE_*` /
/// `FORKLINE_AGENT_*` naming in the external interface.
#[derive(Parser, Debug, Clone)]
#[command(name = "forkline", about = "Local-first control plane for parallel coding agent sessions")]
pub struct Config {
    /// Control Daemon bind host. Always loopback; overriding this to a
    /// non-loopback address is rejected by `validate()`.
    #[arg(long, env = "FORKLINE_CORE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Control Daemon listen port.
    #[arg(long, env = "FORKLINE_CORE_PORT", default_value_t = 34600)]
    pub port: u16,

    /// Agent Control API listen port.
    #[arg(long, env = "FORKLINE_AGENT_PORT", default_value_t = 34567)]
    pub agent_port: u16,

    /// Bearer token override. If unset, resolved from `token_file`, else
    /// generated and persisted on first run.
    #[arg(long, env = "FORKLINE_CORE_TOKEN")]
    pub token: Option<String>,

    /// Path to the persisted token file.
    #[arg(long, env = "FORKLINE_CORE_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    /// Maximum JSON request body size, in bytes.
    #[arg(long, env = "FORKLINE_CORE_MAX_BODY_BYTES", default_value_t = 2_000_000)]
    pub max_body_bytes: usize,

    /// Maximum bytes accepted in a single `pty/write` call.
    #[arg(long, env = "FORKLINE_CORE_MAX_PTY_WRITE_BYTES", default_value_t = 64_000)]
    pub max_pty_write_bytes: usize,

    /// Maximum concurrent SSE clients.
    #[arg(long, env = "FORKLINE_CORE_MAX_SSE_CLIENTS", default_value_t = 64)]
    pub max_sse_clients: usize,

    /// Per-remote-address requests-per-minute cap.
    #[arg(long, env = "FORKLINE_CORE_RATE_LIMIT_PER_MINUTE", default_value_t = 1200)]
    pub rate_limit_per_minute: u32,

    /// Maximum number of concurrently live PTY sessions.
    #[arg(long, env = "FORKLINE_CORE_MAX_PTY_SESSIONS", default_value_t = 256)]
    pub max_pty_sessions: usize,

    /// Per-session output ring buffer capacity, in bytes.
    #[arg(long, env = "FORKLINE_CORE_RING_SIZE", default_value_t = 1_048_576)]
    pub ring_size: usize,

    /// Override for the worktree root convention (tests only); when unset,
    /// worktrees live under `<parent(basePath)>/<basename(basePath)>-worktrees`.
    #[arg(long, env = "FORKLINE_CORE_WORKTREE_ROOT")]
    pub worktree_root: Option<PathBuf>,

    /// How long an approval `?wait=1` long-poll blocks before returning 408.
    #[arg(long, env = "FORKLINE_CORE_APPROVAL_WAIT_SECS", default_value_t = 600)]
    pub approval_wait_secs: u64,

    /// How long a resolved ApprovalRequest is retained before pruning.
    #[arg(long, env = "FORKLINE_CORE_APPROVAL_RETENTION_DAYS", default_value_t = 7)]
    pub approval_retention_days: u64,

    /// Structured log format.
    #[arg(long, env = "FORKLINE_CORE_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level / `EnvFilter` directive.
    #[arg(long, env = "FORKLINE_CORE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validates the resolved configuration, rejecting contradictory or
    /// unsafe combinations before any listener binds.
    pub fn validate(&self) -> Result<(), String> {
        if self.host != "127.0.0.1" && self.host != "localhost" && self.host != "::1" {
            return Err(format!(
                "host must be loopback (127.0.0.1/::1/localhost), got {}",
                self.host
            ));
        }
        if self.max_body_bytes == 0 {
            return Err("max_body_bytes must be nonzero".to_string());
        }
        if self.max_pty_write_bytes == 0 {
            return Err("max_pty_write_bytes must be nonzero".to_string());
        }
        if self.max_pty_write_bytes > self.max_body_bytes {
            return Err("max_pty_write_bytes must not exceed max_body_bytes".to_string());
        }
        if self.max_sse_clients == 0 {
            return Err("max_sse_clients must be nonzero".to_string());
        }
        if self.rate_limit_per_minute == 0 {
            return Err("rate_limit_per_minute must be nonzero".to_string());
        }
        if self.max_pty_sessions == 0 {
            return Err("max_pty_sessions must be nonzero".to_string());
        }
        if self.ring_size < 4096 {
            return Err("ring_size must be at least 4096 bytes".to_string());
        }
        if self.log_format != "json" && self.log_format != "pretty" {
            return Err(format!("unknown log_format {}", self.log_format));
        }
        if self.port == self.agent_port {
            return Err("port and agent_port must differ".to_string());
        }
        Ok(())
    }

    /// Default token file path: `~/.forkline/core.token`.
    pub fn token_file_path(&self) -> PathBuf {
        self.token_file.clone().unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".forkline").join("core.token")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 34600,
            agent_port: 34567,
            token: None,
            token_file: None,
            max_body_bytes: 2_000_000,
            max_pty_write_bytes: 64_000,
            max_sse_clients: 64,
            rate_limit_per_minute: 1200,
            max_pty_sessions: 256,
            ring_size: 1_048_576,
            worktree_root: None,
            approval_wait_secs: 600,
            approval_retention_days: 7,
            log_format: "json".to_string(),
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn default_config_validates() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rejects_non_loopback_host() {
        let mut c = base_config();
        c.host = "0.0.0.0".to_string();
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_same_port_for_both_servers() {
        let mut c = base_config();
        c.agent_port = c.port;
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_write_cap_above_body_cap() {
        let mut c = base_config();
        c.max_pty_write_bytes = c.max_body_bytes + 1;
        assert!(c.validate().is_err());
    }
}
