// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Native PTY spawn via `forkpty`, owned by one supervising task per
//! fleet entry.

use std::collections::HashMap;
use std::ffi::CString;
use std::os::fd::{FromRawFd, OwnedFd};
use std::path::Path;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::pty::{forkpty, Winsize};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{execvp, ForkResult, Pid};
use tokio::io::unix::AsyncFd;

use super::nbio::{self, PtyFd};

/// Environment variable names never forwarded to a spawned session, even
/// if present in the operator's overrides — credentials and ambient
/// daemon state that must not leak into the child's process environment.
const ENV_BLOCKLIST: &[&str] = &[
    "FORKLINE_CORE_TOKEN",
    "FORKLINE_CORE_TOKEN_FILE",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
];

/// Builds the sanitized environment for a new session: strips blocklisted
/// names and empty values, then injects the per-session port/host
/// variables every spawned child agrees on.
pub fn sanitize_env(
    overrides: &HashMap<String, String>,
    task_id: &str,
    allocated_port: u16,
) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars()
        .filter(|(k, v)| !ENV_BLOCKLIST.contains(&k.as_str()) && !v.is_empty())
        .collect();

    for (k, v) in overrides {
        if ENV_BLOCKLIST.contains(&k.as_str()) || v.is_empty() {
            continue;
        }
        env.insert(k.clone(), v.clone());
    }

    env.insert("PORT".to_string(), allocated_port.to_string());
    env.insert("HOST".to_string(), "127.0.0.1".to_string());
    env.insert(
        "ASPNETCORE_URLS".to_string(),
        format!("http://127.0.0.1:{allocated_port}"),
    );
    env.insert("FORKLINE_SESSION_ID".to_string(), task_id.to_string());
    env.insert("FORKLINE_ALLOCATED_PORT".to_string(), allocated_port.to_string());
    env
}

/// A live PTY-backed child process.
pub struct NativePty {
    master: AsyncFd<PtyFd>,
    child_pid: Pid,
    cols: Arc<AtomicU16>,
    rows: Arc<AtomicU16>,
}

impl NativePty {
    /// Forks a PTY-backed shell running `command` with `args` in `cwd`,
    /// with the given initial geometry and sanitized environment.
    pub fn spawn(
        command: &str,
        args: &[String],
        cwd: &Path,
        env: &HashMap<String, String>,
        cols: u16,
        rows: u16,
    ) -> anyhow::Result<Self> {
        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        // SAFETY: forkpty duplicates the calling process. The child branch
        // below only calls async-signal-safe functions (chdir, setenv via
        // execvp's environment array, execvp itself) before exec or exit.
        #[allow(unsafe_code)]
        let fork_result = unsafe { forkpty(Some(&winsize), None) }?;

        match fork_result {
            nix::pty::ForkptyResult::Parent { child, master } => {
                let owned: OwnedFd = master;
                let pty_fd = PtyFd(owned);
                nbio::set_nonblocking(&pty_fd)?;
                let async_fd = AsyncFd::new(pty_fd)?;
                Ok(NativePty {
                    master: async_fd,
                    child_pid: child,
                    cols: Arc::new(AtomicU16::new(cols)),
                    rows: Arc::new(AtomicU16::new(rows)),
                })
            }
            nix::pty::ForkptyResult::Child => {
                let _ = std::env::set_current_dir(cwd);
                for (k, v) in env {
                    std::env::set_var(k, v);
                }
                std::env::set_var("TERM", env.get("TERM").cloned().unwrap_or_else(|| "xterm-256color".to_string()));

                let cmd_c = CString::new(command).unwrap_or_default();
                let mut argv: Vec<CString> = vec![cmd_c.clone()];
                for a in args {
                    argv.push(CString::new(a.as_str()).unwrap_or_default());
                }
                let _ = execvp(&cmd_c, &argv);
                // execvp only returns on failure; exit the child branch
                // immediately rather than unwinding back into the library.
                std::process::exit(127);
            }
        }
    }

    pub async fn read_chunk(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        nbio::read_chunk(&self.master, buf).await
    }

    pub async fn write_all(&self, data: &[u8]) -> std::io::Result<()> {
        nbio::write_all(&self.master, data).await
    }

    pub fn child_pid(&self) -> i32 {
        self.child_pid.as_raw()
    }

    /// Resizes the PTY's controlling terminal via `TIOCSWINSZ`.
    pub fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        #[allow(unsafe_code)]
        {
            // SAFETY: the fd is a valid, open PTY master for the lifetime
            // of `self`; TIOCSWINSZ only updates kernel-side terminal
            // geometry and cannot invalidate the fd.
            let ret = unsafe {
                libc::ioctl(
                    std::os::fd::AsRawFd::as_raw_fd(self.master.get_ref()),
                    libc::TIOCSWINSZ,
                    &winsize as *const Winsize,
                )
            };
            if ret != 0 {
                return Err(anyhow::anyhow!(std::io::Error::last_os_error()));
            }
        }
        self.cols.store(cols, Ordering::Relaxed);
        self.rows.store(rows, Ordering::Relaxed);
        Ok(())
    }

    pub fn send_signal(&self, signal: Signal) -> anyhow::Result<()> {
        kill(self.child_pid, signal)?;
        Ok(())
    }
}

/// Blocking-safe wait for the child to exit, handling `EINTR`. Intended to
/// be run inside `spawn_blocking`.
pub fn wait_for_exit(pid: Pid) -> (Option<i32>, Option<i32>) {
    loop {
        match waitpid(pid, Some(WaitPidFlag::empty())) {
            Ok(WaitStatus::Exited(_, code)) => return (Some(code), None),
            Ok(WaitStatus::Signaled(_, sig, _)) => return (None, Some(sig as i32)),
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(_) => return (None, None),
        }
    }
}

impl Drop for NativePty {
    fn drop(&mut self) {
        let _ = kill(self.child_pid, Signal::SIGHUP);
        std::thread::sleep(Duration::from_millis(50));
        let _ = kill(self.child_pid, Signal::SIGKILL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reads/mutates the real process environment, so it cannot run
    // concurrently with other tests doing the same.
    #[serial_test::serial]
    #[test]
    fn sanitize_env_strips_blocklisted_and_injects_port_vars() {
        std::env::set_var("FORKLINE_CORE_TOKEN", "should-not-leak");
        let env = sanitize_env(&HashMap::new(), "task-1", 20005);
        std::env::remove_var("FORKLINE_CORE_TOKEN");

        assert!(!env.contains_key("FORKLINE_CORE_TOKEN"));
        assert_eq!(env.get("PORT").map(String::as_str), Some("20005"));
        assert_eq!(env.get("FORKLINE_SESSION_ID").map(String::as_str), Some("task-1"));
        assert_eq!(env.get("HOST").map(String::as_str), Some("127.0.0.1"));
    }

    #[serial_test::serial]
    #[test]
    fn sanitize_env_drops_empty_overrides() {
        let mut overrides = HashMap::new();
        overrides.insert("SOME_VAR".to_string(), String::new());
        overrides.insert("OTHER_VAR".to_string(), "value".to_string());
        let env = sanitize_env(&overrides, "task-2", 20006);

        assert!(!env.contains_key("SOME_VAR"));
        assert_eq!(env.get("OTHER_VAR").map(String::as_str), Some("value"));
    }
}
