//! Token estimation for conversation turns
//!
//! Uses the ~4 characters per token heuristic. The result is only used to
//! decide *when* to compact, so an error of 20-30% against a real tokenizer
//! is acceptable.

use crate::types::{Part, Turn};

const CHARS_PER_TOKEN: usize = 4;

/// Token estimator for conversation turns
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenEstimator;

impl TokenEstimator {
    /// Estimate tokens for a request: all turns plus the system instruction
    pub fn estimate(turns: &[Turn], system_instruction: Option<&str>) -> usize {
        let instruction_tokens = system_instruction.map_or(0, Self::estimate_str);
        Self::estimate_turns(turns) + instruction_tokens
    }

    /// Estimate tokens for turns, counting every kind of part
    pub fn estimate_turns(turns: &[Turn]) -> usize {
        turns.iter().map(Self::estimate_turn).sum()
    }

    /// Estimate tokens for a single turn
    pub fn estimate_turn(turn: &Turn) -> usize {
        turn.parts.iter().map(Self::estimate_part).sum()
    }

    /// Estimate only the text parts of a turn
    ///
    /// Used when walking back from the end of the conversation to size the
    /// verbatim window.
    pub fn estimate_turn_text(turn: &Turn) -> usize {
        turn.parts
            .iter()
            .filter_map(Part::as_text)
            .map(Self::estimate_str)
            .sum()
    }

    /// Estimate only the text parts of a slice of turns
    pub fn estimate_text(turns: &[Turn]) -> usize {
        turns.iter().map(Self::estimate_turn_text).sum()
    }

    /// Estimate tokens for a string
    pub fn estimate_str(text: &str) -> usize {
        text.len() / CHARS_PER_TOKEN
    }

    fn estimate_part(part: &Part) -> usize {
        match part {
            Part::Text { value } => Self::estimate_str(value),
            Part::ToolCall { name, args } => {
                Self::estimate_str(name) + Self::estimate_str(&render_value(args))
            }
            Part::ToolResult { name, result } => {
                Self::estimate_str(name) + Self::estimate_str(&render_value(result))
            }
        }
    }
}

/// Serialized form of a tool payload; null payloads count as empty
fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use serde_json::json;

    #[test]
    fn test_text_parts() {
        let turns = vec![Turn::user("a".repeat(400)), Turn::assistant("b".repeat(40))];
        assert_eq!(TokenEstimator::estimate(&turns, None), 110);
    }

    #[test]
    fn test_system_instruction_counts() {
        let turns = vec![Turn::user("x".repeat(8))];
        assert_eq!(TokenEstimator::estimate(&turns, Some(&"s".repeat(80))), 22);
    }

    #[test]
    fn test_tool_parts() {
        // name "read_file" = 9 chars -> 2, args {"path":"/tmp/a.txt"} = 21 chars -> 5
        let call = Turn::tool_call("read_file", json!({"path": "/tmp/a.txt"}));
        assert_eq!(TokenEstimator::estimate_turn(&call), 7);

        // result "hello world!" with quotes = 14 chars -> 3
        let result = Turn::tool_result("read_file", json!("hello world!"));
        assert_eq!(TokenEstimator::estimate_turn(&result), 5);

        // tool payloads are not text
        assert_eq!(TokenEstimator::estimate_turn_text(&call), 0);
    }

    #[test]
    fn test_per_part_integer_division() {
        let turn = Turn::new(Role::User, vec![Part::text("abc"), Part::text("abc")]);
        assert_eq!(TokenEstimator::estimate_turn(&turn), 0);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(TokenEstimator::estimate(&[], None), 0);
        assert_eq!(TokenEstimator::estimate_text(&[]), 0);
    }
}
