// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `forkline` — local-first control plane core: a headless orchestration
//! daemon for running many interactive coding agent CLIs in parallel,
//! each confined to an isolated git worktree.
//!
//! This crate is the daemon binary's library half: the PTY State Machine
//! (`psm`), the PTY Supervisor (`fleet`/`pty`), the Worktree Manager
//! (`worktree`), the Control Daemon (`transport`), and the Approval
//! Gateway (`approval`), wired together by `run`.

pub mod approval;
pub mod config;
pub mod error;
pub mod events;
pub mod fleet;
pub mod logging;
pub mod psm;
pub mod pty;
pub mod ring;
pub mod run;
pub mod token;
pub mod transport;
pub mod validate;
pub mod worktree;
