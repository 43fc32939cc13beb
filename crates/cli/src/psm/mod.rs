// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY State Machine: a pure function over a terminal byte stream producing
//! a mode classification with confidence and an optional blocked reason.
//! No I/O — every method here is synchronous and side-effect free beyond
//! mutating its own state.

pub mod rules;

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Longest tail of normalized output kept for detector matching. Bounded
/// so a session with a huge single write doesn't grow this unboundedly.
const TAIL_WINDOW: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Booting,
    Shell,
    Agent,
    Tui,
    Blocked,
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// The classification the PSM reports after each mutation. Every field
/// change bumps `mode_seq`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeState {
    pub mode: Mode,
    pub confidence: Confidence,
    pub is_blocked: bool,
    pub blocked_reason: Option<String>,
    pub provider: Option<String>,
    pub mode_seq: u64,
    pub alt_screen: bool,
}

impl ModeState {
    fn initial() -> Self {
        ModeState {
            mode: Mode::Booting,
            confidence: Confidence::Low,
            is_blocked: false,
            blocked_reason: None,
            provider: None,
            mode_seq: 0,
            alt_screen: false,
        }
    }
}

// Every pattern below is a fixed literal exercised by the detector tests
// in this module and in `rules::tests` — a compile failure here is a
// build-time defect, not a condition callers can recover from, so each
// site carries a narrow allow rather than threading a `Result` through
// every detector on the hot output-consuming path (same discipline as
// the narrow `#[allow(unsafe_code)]` in `pty::spawn`).
static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\x1b(\[[0-9;?]*[a-zA-Z]|\].*?\x07|[()][A-Z0-9])").expect("static ANSI escape pattern")
});
static ALT_SCREEN_ENTER: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\x1b\[\?1049h").expect("static alt-screen-enter pattern")
});
static ALT_SCREEN_EXIT: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\x1b\[\?1049l").expect("static alt-screen-exit pattern")
});
static SHELL_PROMPT: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(rules::SHELL_PROMPT_PATTERN).expect("static shell prompt pattern")
});
static FORKLINE_EVENT: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(rules::FORKLINE_EVENT_OSC_PATTERN).expect("static forkline event pattern")
});

struct CompiledBlockedRule {
    name: &'static str,
    re: Regex,
}

static BLOCKED_RULES: LazyLock<Vec<CompiledBlockedRule>> = LazyLock::new(|| {
    rules::BLOCKED_PROMPT_RULES
        .iter()
        .map(|r| {
            let pattern = if r.case_insensitive {
                format!("(?i){}", r.pattern)
            } else {
                r.pattern.to_string()
            };
            #[allow(clippy::expect_used)]
            let re = Regex::new(&pattern).expect("blocked prompt pattern must compile");
            CompiledBlockedRule { name: r.name, re }
        })
        .collect()
});

struct CompiledBannerRule {
    provider: &'static str,
    re: Regex,
}

static BANNER_RULES: LazyLock<Vec<CompiledBannerRule>> = LazyLock::new(|| {
    rules::PROVIDER_BANNER_RULES
        .iter()
        .map(|r| {
            #[allow(clippy::expect_used)]
            let re = Regex::new(r.pattern).expect("provider banner pattern must compile");
            CompiledBannerRule { provider: r.provider, re }
        })
        .collect()
});

/// Strips ANSI/OSC escape sequences and collapses trailing CR/LF +
/// whitespace before rule matching.
fn normalize(raw: &str) -> String {
    let stripped = ANSI_ESCAPE.replace_all(raw, "");
    stripped
        .lines()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Per-session PTY State Machine instance.
pub struct Psm {
    state: ModeState,
    tail: String,
}

impl Default for Psm {
    fn default() -> Self {
        Self::new()
    }
}

impl Psm {
    pub fn new() -> Self {
        Psm {
            state: ModeState::initial(),
            tail: String::new(),
        }
    }

    /// `start() -> ModeState`: the initial `{mode:booting, confidence:low,
    /// modeSeq:0}` state, before any bytes are observed.
    pub fn start(&self) -> ModeState {
        self.state.clone()
    }

    pub fn current(&self) -> ModeState {
        self.state.clone()
    }

    /// `consumeOutput(bytes) -> ModeState`. Idempotent on equal bytes fed
    /// twice in a row (no new information, so no new transition). Runs
    /// the ordered detector list; the first rule that fires this call
    /// wins tie-breaks (alt-screen > provider marker > blocked-prompt >
    /// shell-prompt).
    pub fn consume_output(&mut self, bytes: &[u8]) -> ModeState {
        let chunk = String::from_utf8_lossy(bytes);

        // Alt-screen transitions are scanned on the raw chunk: stripping
        // first would remove the very sequence being matched.
        let alt_screen = if ALT_SCREEN_ENTER.is_match(&chunk) {
            true
        } else if ALT_SCREEN_EXIT.is_match(&chunk) {
            false
        } else {
            self.state.alt_screen
        };

        let normalized_chunk = normalize(&chunk);
        self.tail.push_str(&normalized_chunk);
        if self.tail.len() > TAIL_WINDOW {
            let cut = self.tail.len() - TAIL_WINDOW;
            self.tail = self.tail[cut..].to_string();
        }

        let mut next = self.state.clone();
        next.alt_screen = alt_screen;

        if alt_screen && !self.state.alt_screen {
            // 1. Alt-screen entry: high confidence, always wins this call.
            next.mode = Mode::Tui;
            next.confidence = Confidence::High;
        } else if let Some(caps) = FORKLINE_EVENT.captures(&chunk) {
            // 2a. Explicit Forkline lifecycle marker.
            let is_exit = caps.get(1).map(|m| m.as_str()) == Some("agent_exited");
            if is_exit {
                next.mode = Mode::Shell;
                next.confidence = Confidence::Medium;
                next.provider = None;
            } else {
                next.mode = Mode::Agent;
                next.confidence = Confidence::High;
                next.provider = caps.get(3).map(|m| m.as_str().to_string());
            }
        } else if let Some(banner) = BANNER_RULES.iter().find(|r| r.re.is_match(&self.tail)) {
            // 2b. Heuristic provider banner.
            next.mode = Mode::Agent;
            next.confidence = Confidence::Medium;
            next.provider = Some(banner.provider.to_string());
        } else if let Some((name, reason)) = detect_blocked(&self.tail) {
            // 3. Blocked confirmation prompt.
            let _ = name;
            next.mode = Mode::Blocked;
            next.confidence = Confidence::High;
            next.is_blocked = true;
            next.blocked_reason = Some(reason);
        } else if SHELL_PROMPT.is_match(&self.tail) {
            // 4. Shell prompt clears blocked and asserts shell.
            next.mode = Mode::Shell;
            next.confidence = Confidence::Medium;
            next.is_blocked = false;
            next.blocked_reason = None;
        }

        self.apply(next)
    }

    /// `consumeInput(bytes) -> ModeState`: any user write provisionally
    /// clears `isBlocked`; a following `consumeOutput` without the prompt
    /// reasserting confirms the clear (or re-sets it if the prompt is
    /// still present in the tail, e.g. the input was rejected). The tail
    /// is cleared here so that stale prompt text already answered can't
    /// re-match the blocked detector against output that hasn't arrived
    /// yet — only what the next `consumeOutput` actually carries counts.
    pub fn consume_input(&mut self, _bytes: &[u8]) -> ModeState {
        self.tail.clear();
        let mut next = self.state.clone();
        next.is_blocked = false;
        next.blocked_reason = None;
        self.apply(next)
    }

    /// `consumeExit(code, signal) -> ModeState`.
    pub fn consume_exit(&mut self, _code: Option<i32>, _signal: Option<i32>) -> ModeState {
        let mut next = self.state.clone();
        next.mode = Mode::Exited;
        next.confidence = Confidence::High;
        next.is_blocked = false;
        next.blocked_reason = None;
        self.apply(next)
    }

    /// `reconcile(source?) -> ModeState`: re-derives mode from the given
    /// tail bytes (typically the session's output ring tail) after a
    /// subscriber replay, discarding any provisional clears from
    /// `consumeInput` in the interim.
    pub fn reconcile(&mut self, source: Option<&[u8]>) -> ModeState {
        if let Some(bytes) = source {
            self.tail.clear();
            self.state.alt_screen = false;
            return self.consume_output(bytes);
        }
        self.state.clone()
    }

    /// Applies `next`, bumping `mode_seq` only if any field actually
    /// changed (so idempotent replays of identical bytes never advance
    /// the sequence).
    fn apply(&mut self, mut next: ModeState) -> ModeState {
        if next.mode != self.state.mode
            || next.confidence != self.state.confidence
            || next.is_blocked != self.state.is_blocked
            || next.blocked_reason != self.state.blocked_reason
            || next.provider != self.state.provider
            || next.alt_screen != self.state.alt_screen
        {
            next.mode_seq = self.state.mode_seq + 1;
            self.state = next.clone();
        } else {
            next.mode_seq = self.state.mode_seq;
        }
        next
    }
}

/// Returns the first matching blocked-prompt rule whose match ends at (or
/// very near) the tail end with no newline after it — i.e. the prompt is
/// still awaiting a reply, not already scrolled past.
fn detect_blocked(tail: &str) -> Option<(&'static str, String)> {
    for rule in BLOCKED_RULES.iter() {
        if let Some(m) = rule.re.find(tail) {
            let after = &tail[m.end()..];
            if !after.contains('\n') {
                let line_start = tail[..m.start()].rfind('\n').map(|i| i + 1).unwrap_or(0);
                let line_end = tail[m.end()..]
                    .find('\n')
                    .map(|i| m.end() + i)
                    .unwrap_or(tail.len());
                let line = tail[line_start..line_end].trim();
                let truncated: String = line.chars().take(200).collect();
                return Some((rule.name, truncated));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_returns_booting_low_confidence_seq_zero() {
        let psm = Psm::new();
        let s = psm.start();
        assert_eq!(s.mode, Mode::Booting);
        assert_eq!(s.confidence, Confidence::Low);
        assert_eq!(s.mode_seq, 0);
    }

    #[test]
    fn scenario_blocked_detection_then_confirmed_shell() {
        let mut psm = Psm::new();
        let s = psm.consume_output(b"Do you want to proceed? [y/N]");
        assert!(s.is_blocked);
        assert_eq!(s.mode, Mode::Blocked);
        assert_eq!(s.blocked_reason.as_deref(), Some("Do you want to proceed? [y/N]"));

        psm.consume_input(b"y\r");
        let s2 = psm.consume_output(b"$ ");
        assert!(!s2.is_blocked);
        assert_eq!(s2.mode, Mode::Shell);
    }

    #[test]
    fn scenario_alt_screen_tui() {
        let mut psm = Psm::new();
        let s = psm.consume_output(b"\x1b[?1049hsome tui content");
        assert_eq!(s.mode, Mode::Tui);
        assert!(s.alt_screen);

        let s2 = psm.consume_output(b"\x1b[?1049l$ ");
        assert!(!s2.alt_screen);
        assert_eq!(s2.mode, Mode::Shell);
    }

    #[test]
    fn chunk_boundary_idempotence() {
        let whole = b"Do you want to proceed? [y/N]".to_vec();
        let mut one_shot = Psm::new();
        let s1 = one_shot.consume_output(&whole);

        let mut chunked = Psm::new();
        let mut last = chunked.start();
        for byte in &whole {
            last = chunked.consume_output(std::slice::from_ref(byte));
        }

        assert_eq!(s1.mode, last.mode);
        assert_eq!(s1.is_blocked, last.is_blocked);
        assert_eq!(s1.blocked_reason, last.blocked_reason);
    }

    #[test]
    fn repeated_identical_output_does_not_advance_mode_seq() {
        let mut psm = Psm::new();
        let s1 = psm.consume_output(b"$ ");
        let s2 = psm.consume_output(b"");
        assert_eq!(s1.mode_seq, s2.mode_seq);
    }

    #[test]
    fn consume_exit_sets_exited_mode() {
        let mut psm = Psm::new();
        psm.consume_output(b"$ ");
        let s = psm.consume_exit(Some(0), None);
        assert_eq!(s.mode, Mode::Exited);
        assert!(!s.is_blocked);
    }

    #[test]
    fn provider_banner_sets_agent_mode() {
        let mut psm = Psm::new();
        let s = psm.consume_output(b"Claude Code v2.1\nReady.\n");
        assert_eq!(s.mode, Mode::Agent);
        assert_eq!(s.provider.as_deref(), Some("claude"));
    }

    #[test]
    fn forkline_event_marker_sets_agent_started_and_exited() {
        let mut psm = Psm::new();
        let start = psm.consume_output(b"\x1b]1337;ForklineEvent=type=agent_started;provider=codex\x07");
        assert_eq!(start.mode, Mode::Agent);
        assert_eq!(start.provider.as_deref(), Some("codex"));

        let exit = psm.consume_output(b"\x1b]1337;ForklineEvent=type=agent_exited\x07");
        assert_eq!(exit.mode, Mode::Shell);
    }

    #[test]
    fn reconcile_rederives_mode_from_given_tail() {
        let mut psm = Psm::new();
        psm.consume_output(b"\x1b[?1049h");
        let s = psm.reconcile(Some(b"$ "));
        assert_eq!(s.mode, Mode::Shell);
        assert!(!s.alt_screen);
    }
}
