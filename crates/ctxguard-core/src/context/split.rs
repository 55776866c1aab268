//! Boundary selection between summarized and verbatim turns
//!
//! A split index `idx` partitions turns into `[0, idx)` (summarized) and
//! `[idx, len)` (kept verbatim). A split never leaves a tool result in the
//! kept range whose tool call went to the summarized range.

use super::estimator::TokenEstimator;
use crate::types::Turn;

/// Picks split points that respect tool call/result pairing
#[derive(Debug, Clone, Copy, Default)]
pub struct SplitPointSelector;

impl SplitPointSelector {
    /// Split so that the kept turns fit in `recent_budget_tokens`
    ///
    /// Walks backwards accumulating text tokens. The turn that reaches the
    /// budget goes to the summarized range, but at least two turns stay
    /// verbatim. When the budget is never reached the conversation is split
    /// in half. Conversations shorter than three turns always keep exactly
    /// one turn verbatim.
    pub fn select_split(turns: &[Turn], recent_budget_tokens: usize) -> usize {
        let len = turns.len();
        if len < 3 {
            return Self::safe_split(turns, len.saturating_sub(1));
        }

        let mut tokens = 0;
        let mut candidate = len / 2;
        for i in (0..len).rev() {
            tokens += TokenEstimator::estimate_turn_text(&turns[i]);
            if tokens >= recent_budget_tokens {
                candidate = if i + 2 < len { i + 1 } else { len - 2 };
                break;
            }
        }

        Self::safe_split(turns, candidate)
    }

    /// Split keeping the last `keep_recent` turns, adjusted for tool pairing
    pub fn split_keeping(turns: &[Turn], keep_recent: usize) -> usize {
        let candidate = turns.len().saturating_sub(keep_recent);
        Self::safe_split(turns, candidate)
    }

    /// Move a candidate split earlier until no kept tool result is orphaned
    ///
    /// A tool result whose call sits earlier in its own turn is
    /// self-contained. Any other kept tool result is paired with the closest
    /// earlier turn calling the same tool. If that call lies before the split, the split moves to
    /// it, and the check repeats for the newly kept turns. A kept tool result
    /// with no matching call at all still pulls in the one turn before it.
    pub fn safe_split(turns: &[Turn], candidate: usize) -> usize {
        let mut idx = candidate.min(turns.len());
        while idx > 0 && idx < turns.len() {
            match Self::orphaned_call_index(turns, idx) {
                Some(call_idx) => idx = call_idx,
                None => break,
            }
        }
        idx
    }

    /// Earliest summarized turn whose tool call is answered in the kept range
    fn orphaned_call_index(turns: &[Turn], split: usize) -> Option<usize> {
        turns
            .iter()
            .enumerate()
            .skip(split)
            .flat_map(|(pos, turn)| turn.unanswered_result_names().map(move |name| (pos, name)))
            .filter_map(|(pos, name)| {
                (0..pos)
                    .rev()
                    .find(|&j| turns[j].calls_tool(name))
                    .or_else(|| (pos == split).then(|| split.saturating_sub(1)))
            })
            .filter(|&call_idx| call_idx < split)
            .min()
    }

    /// Whether a split keeps every tool call with the results answering it
    pub fn is_safe(turns: &[Turn], split: usize) -> bool {
        split == 0 || split >= turns.len() || Self::orphaned_call_index(turns, split).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Part, Role};
    use serde_json::json;

    fn text_turns(count: usize, chars: usize) -> Vec<Turn> {
        (0..count)
            .map(|i| {
                if i % 2 == 0 {
                    Turn::user("u".repeat(chars))
                } else {
                    Turn::assistant("a".repeat(chars))
                }
            })
            .collect()
    }

    #[test]
    fn test_budget_reached_keeps_turns_within_budget() {
        // 10 turns of 100 tokens each; budget 250 is reached at index 7
        let turns = text_turns(10, 400);
        let split = SplitPointSelector::select_split(&turns, 250);
        assert_eq!(split, 8);
        assert!(TokenEstimator::estimate_text(&turns[split..]) < 250);
    }

    #[test]
    fn test_budget_reached_on_last_turn_keeps_two() {
        let mut turns = text_turns(6, 40);
        turns.push(Turn::user("x".repeat(4_000)));
        let split = SplitPointSelector::select_split(&turns, 500);
        assert_eq!(split, turns.len() - 2);
    }

    #[test]
    fn test_short_conversation_splits_in_half() {
        let turns = text_turns(8, 40);
        assert_eq!(SplitPointSelector::select_split(&turns, 1_000_000), 4);
    }

    #[test]
    fn test_fewer_than_three_turns_keeps_one() {
        let turns = text_turns(2, 40);
        assert_eq!(SplitPointSelector::select_split(&turns, 1_000_000), 1);
        assert_eq!(SplitPointSelector::select_split(&turns, 1), 1);

        let single = text_turns(1, 40);
        assert_eq!(SplitPointSelector::select_split(&single, 1), 0);
        assert_eq!(SplitPointSelector::select_split(&[], 1), 0);
    }

    #[test]
    fn test_tool_result_pulls_call_into_recent() {
        let turns = vec![
            Turn::user("u".repeat(400)),
            Turn::assistant("a".repeat(400)),
            Turn::user("find the file"),
            Turn::tool_call("search", json!({"q": "main.rs"})),
            Turn::tool_result("search", json!(["src/main.rs"])),
            Turn::assistant("found it"),
        ];
        assert_eq!(SplitPointSelector::safe_split(&turns, 4), 3);
        assert!(SplitPointSelector::is_safe(&turns, 3));
        assert!(!SplitPointSelector::is_safe(&turns, 4));
    }

    #[test]
    fn test_parallel_results_follow_their_call() {
        let turns = vec![
            Turn::user("check both"),
            Turn::new(
                Role::Assistant,
                vec![
                    Part::tool_call("weather", json!({"city": "Lisbon"})),
                    Part::tool_call("clock", json!({"tz": "WET"})),
                ],
            ),
            Turn::tool_result("weather", json!("sunny")),
            Turn::tool_result("clock", json!("12:00")),
            Turn::assistant("Sunny, noon."),
        ];
        // Splitting before the second result must pull in the call turn
        assert_eq!(SplitPointSelector::safe_split(&turns, 3), 1);
    }

    #[test]
    fn test_non_adjacent_result_is_protected() {
        let turns = vec![
            Turn::user("go"),
            Turn::tool_call("build", json!({})),
            Turn::assistant("building..."),
            Turn::tool_result("build", json!("ok")),
        ];
        assert_eq!(SplitPointSelector::safe_split(&turns, 2), 1);
    }

    #[test]
    fn test_result_without_call_moves_back_one() {
        let turns = vec![
            Turn::user("hello"),
            Turn::assistant("hi"),
            Turn::tool_result("ghost", json!(null)),
            Turn::assistant("done"),
        ];
        assert_eq!(SplitPointSelector::safe_split(&turns, 2), 1);
    }

    fn paired_turns(count: usize) -> Vec<Turn> {
        (0..count)
            .map(|i| {
                if i % 2 == 0 {
                    Turn::user("u".repeat(400))
                } else {
                    Turn::new(
                        Role::Assistant,
                        vec![
                            Part::tool_call("search", json!({"q": i})),
                            Part::tool_result("search", json!(["hit"])),
                        ],
                    )
                }
            })
            .collect()
    }

    #[test]
    fn test_same_turn_pairs_are_self_contained() {
        let turns = paired_turns(20);
        assert!(SplitPointSelector::is_safe(&turns, 16));
        assert!(SplitPointSelector::is_safe(&turns, 17));
        assert_eq!(SplitPointSelector::safe_split(&turns, 16), 16);
        assert_eq!(SplitPointSelector::split_keeping(&turns, 6), 14);

        // User turns at 18, 16 and 14 reach the budget of 250
        assert_eq!(SplitPointSelector::select_split(&turns, 250), 15);
    }

    #[test]
    fn test_same_turn_call_does_not_cover_other_tools() {
        let turns = vec![
            Turn::user("go"),
            Turn::tool_call("fetch", json!({"url": "a"})),
            Turn::new(
                Role::Assistant,
                vec![
                    Part::tool_call("search", json!({})),
                    Part::tool_result("search", json!([])),
                    Part::tool_result("fetch", json!("page")),
                ],
            ),
            Turn::assistant("done"),
        ];
        assert!(!SplitPointSelector::is_safe(&turns, 2));
        assert_eq!(SplitPointSelector::safe_split(&turns, 2), 1);
    }

    #[test]
    fn test_split_keeping() {
        let turns = text_turns(27, 40);
        assert_eq!(SplitPointSelector::split_keeping(&turns, 6), 21);
        assert_eq!(SplitPointSelector::split_keeping(&turns, 100), 0);
    }

    #[test]
    fn test_select_split_never_separates_pairs() {
        // Alternate call/result pairs with text in between, across many budgets
        let mut turns = Vec::new();
        for i in 0..12 {
            turns.push(Turn::user(format!("request {} {}", i, "x".repeat(120))));
            turns.push(Turn::tool_call("lookup", json!({"i": i})));
            turns.push(Turn::tool_result("lookup", json!({"value": "y".repeat(200)})));
            turns.push(Turn::assistant("z".repeat(80)));
        }
        for budget in [0, 1, 10, 25, 50, 100, 200, 400, 800, 5_000] {
            let split = SplitPointSelector::select_split(&turns, budget);
            assert!(split <= turns.len());
            assert!(
                SplitPointSelector::is_safe(&turns, split),
                "budget {} produced unsafe split {}",
                budget,
                split
            );
            if split < turns.len() {
                assert!(!turns[split].has_tool_result());
            }
        }
    }
}
