// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Data tables for the detectors the PTY State Machine runs in order.
//!
//! Kept as plain data rather than branching code so new providers and
//! prompt phrasings can be added without touching `psm::consume_output`.

/// A blocked-confirmation-prompt pattern. `pattern` is matched against the
/// ANSI-stripped tail of recent output; `case_insensitive` mirrors common
/// CLI phrasing variance ("Proceed?" vs "proceed?").
pub struct BlockedPromptRule {
    pub name: &'static str,
    pub pattern: &'static str,
    pub case_insensitive: bool,
}

/// Ordered for readability only — all rules are evaluated and the first
/// match against the tail wins.
pub const BLOCKED_PROMPT_RULES: &[BlockedPromptRule] = &[
    BlockedPromptRule {
        name: "proceed_run_question",
        pattern: r"Do you want to (proceed|run|continue)\??",
        case_insensitive: true,
    },
    BlockedPromptRule {
        name: "yn_bracket",
        pattern: r"\[y/N\]",
        case_insensitive: false,
    },
    BlockedPromptRule {
        name: "yn_paren",
        pattern: r"\(y/n\)\??",
        case_insensitive: true,
    },
    BlockedPromptRule {
        name: "press_enter_to_continue",
        pattern: r"Press Enter to continue",
        case_insensitive: true,
    },
    BlockedPromptRule {
        name: "type_y_to",
        pattern: r"Type 'y' to",
        case_insensitive: true,
    },
    BlockedPromptRule {
        name: "overwrite_confirm",
        pattern: r"Overwrite\?",
        case_insensitive: true,
    },
    BlockedPromptRule {
        name: "allow_tool_permission",
        pattern: r"Allow (this tool|.*) to run\??",
        case_insensitive: true,
    },
];

/// Matches a POSIX-ish shell prompt terminator at the end of a line:
/// `$` or `#` (root), optionally preceded by a path/user@host segment.
/// Matched against the normalized tail, which has trailing whitespace
/// already trimmed off every line — so the terminator itself carries no
/// trailing space here.
pub const SHELL_PROMPT_PATTERN: &str = r"(^|\n)[^\n]*[$#]$";

/// Provider banner markers the agent-marker detector recognizes, keyed by
/// provider name, matched against the ANSI-stripped tail.
pub struct ProviderBannerRule {
    pub provider: &'static str,
    pub pattern: &'static str,
}

pub const PROVIDER_BANNER_RULES: &[ProviderBannerRule] = &[
    ProviderBannerRule {
        provider: "claude",
        pattern: r"Claude Code",
    },
    ProviderBannerRule {
        provider: "codex",
        pattern: r"OpenAI Codex",
    },
    ProviderBannerRule {
        provider: "gemini",
        pattern: r"Gemini CLI",
    },
    ProviderBannerRule {
        provider: "aider",
        pattern: r"aider v\d",
    },
];

/// The OSC escape Forkline-aware agent CLIs may emit to declare their own
/// lifecycle explicitly, overriding heuristic banner detection:
/// `ESC ] 1337 ; ForklineEvent=type=agent_started;provider=<p> BEL`.
pub const FORKLINE_EVENT_OSC_PATTERN: &str =
    r"\x1b\]1337;ForklineEvent=type=(agent_started|agent_exited)(;provider=([a-zA-Z0-9_-]+))?\x07";

#[cfg(test)]
mod tests {
    use crate::psm::{Mode, Psm};

    #[yare::parameterized(
        proceed_question = { "Do you want to proceed? [y/N]" },
        run_question = { "Do you want to run this command?" },
        yn_bracket_only = { "rm important-file.txt [y/N]" },
        yn_paren = { "Apply patch (y/n)?" },
        press_enter = { "Press Enter to continue" },
        type_y = { "Type 'y' to confirm deletion" },
        overwrite = { "File exists. Overwrite?" },
        allow_tool = { "Allow Bash to run?" },
    )]
    fn recognized_prompts_set_blocked_mode(prompt: &str) {
        let mut psm = Psm::new();
        let state = psm.consume_output(prompt.as_bytes());
        assert_eq!(state.mode, Mode::Blocked, "expected {prompt:?} to block");
        assert!(state.is_blocked);
        assert!(state.blocked_reason.is_some());
    }

    #[yare::parameterized(
        claude = { "Claude Code v2.4.0\n", "claude" },
        codex = { "OpenAI Codex CLI starting\n", "codex" },
        gemini = { "Gemini CLI ready\n", "gemini" },
        aider = { "aider v0.65.0\n", "aider" },
    )]
    fn recognized_banners_set_provider(banner: &str, provider: &str) {
        let mut psm = Psm::new();
        let state = psm.consume_output(banner.as_bytes());
        assert_eq!(state.mode, Mode::Agent);
        assert_eq!(state.provider.as_deref(), Some(provider));
    }
}
