//! Summary prompt construction and transcript rendering

use crate::types::{Part, Role, Turn};
use std::fmt::Write;

/// Leading marker of the synthetic summary turn
pub const SUMMARY_OPEN_MARKER: &str = "[Previous conversation summary]";
/// Trailing marker of the synthetic summary turn
pub const SUMMARY_CLOSE_MARKER: &str = "[End of summary - conversation continues below]";

/// Separator between a previous summary and new excerpts in the fallback summary
const FALLBACK_SEPARATOR: &str = "\n\n---\n\n";

/// System instruction for the summarization call
///
/// The four sections are what a cold-started caller needs to resume with no
/// prior turns: open threads, facts, decisions and concrete next actions.
pub const SUMMARY_SYSTEM_PROMPT: &str = r#"You are compressing a conversation so it can be resumed later.

This summary will be the ONLY context available when the conversation continues. Every earlier message will be discarded. Be thorough.

Your summary must contain these sections:

## Current State

- What is being discussed or worked on (quote the user's request when there is one)
- What has been completed so far
- What was in progress at the moment of summarization (unfinished work, open threads)
- What is still outstanding, stated specifically

## Key Information

- Concrete facts and details: names, dates, numbers, URLs, identifiers
- Preferences, instructions and constraints the user stated
- Terminology and domain knowledge established in the conversation
- External resources or references that were mentioned

## Context & Decisions

- Decisions taken and the reasons given
- Options considered and rejected, with reasons
- Assumptions in effect
- Corrections or clarifications that changed direction
- Known blockers, risks and open questions

## Exact Next Steps

List precisely what should happen next, with enough detail that a reader of this summary alone can continue without asking anything. Never write "continue with the task".

Write as if handing the conversation over to a colleague mid-way. Use the same language the conversation uses. Within the word limit below, prefer more detail over less."#;

/// Full system instruction including the dynamic word limit
pub fn build_system_instruction(max_words: usize) -> String {
    format!(
        "{}\n\nKeep the summary under {} words.",
        SUMMARY_SYSTEM_PROMPT, max_words
    )
}

/// User prompt: optional previous summary to merge, then the transcript
pub fn build_summary_prompt(turns: &[Turn], previous_summary: Option<&str>) -> String {
    let mut prompt = String::from("Provide a detailed summary of the following conversation.\n\n");

    if let Some(previous) = previous_summary.filter(|s| !s.is_empty()) {
        prompt.push_str("[Previous summary for context]\n");
        prompt.push_str(previous);
        prompt.push_str("\n[End previous summary]\n\n");
        prompt.push_str(
            "Merge the previous summary into the new one, updating anything that has changed.\n\n",
        );
    }

    prompt.push_str("[Conversation to summarize]\n");
    prompt.push_str(&render_transcript(turns));
    prompt.push_str("[End of conversation]\n");
    prompt
}

/// Flat transcript, one line per part
///
/// Text parts render as `role: text`; tool parts render as a bracketed note.
pub fn render_transcript(turns: &[Turn]) -> String {
    let mut out = String::new();
    for turn in turns {
        for part in &turn.parts {
            write_part_line(&mut out, turn.role, part, None);
        }
    }
    out
}

/// Summary built without a model
///
/// Keeps the first `excerpt_chars` characters of every text part, prefixed
/// by the previous summary. Tool activity is noted too, so the result is
/// never empty for non-empty input.
pub fn build_fallback_summary(
    turns: &[Turn],
    previous_summary: Option<&str>,
    excerpt_chars: usize,
) -> String {
    let mut out = String::new();
    if let Some(previous) = previous_summary.filter(|s| !s.is_empty()) {
        out.push_str(previous);
        out.push_str(FALLBACK_SEPARATOR);
    }

    for turn in turns {
        for part in &turn.parts {
            write_part_line(&mut out, turn.role, part, Some(excerpt_chars));
        }
    }
    out
}

fn write_part_line(out: &mut String, role: Role, part: &Part, excerpt_chars: Option<usize>) {
    let _ = match part {
        Part::Text { value } if value.is_empty() => Ok(()),
        Part::Text { value } => match excerpt_chars {
            Some(max) => writeln!(out, "{}: {}", role, excerpt(value, max)),
            None => writeln!(out, "{}: {}", role, value),
        },
        Part::ToolCall { name, .. } => writeln!(out, "{}: [called tool: {}]", role, name),
        Part::ToolResult { name, .. } => {
            writeln!(out, "{}: [tool {} returned a result]", role, name)
        }
    };
}

/// First `max_chars` characters, with `...` appended when truncated
fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// The synthetic leading turn carrying a summary
pub fn summary_turn(summary: &str) -> Turn {
    Turn::new(
        Role::User,
        vec![Part::text(format!(
            "{}\n{}\n{}",
            SUMMARY_OPEN_MARKER, summary, SUMMARY_CLOSE_MARKER
        ))],
    )
}

/// Whether a turn is a previously injected summary turn
pub fn is_summary_turn(turn: &Turn) -> bool {
    turn.role == Role::User
        && matches!(
            turn.parts.first(),
            Some(Part::Text { value }) if value.starts_with(SUMMARY_OPEN_MARKER)
        )
}
