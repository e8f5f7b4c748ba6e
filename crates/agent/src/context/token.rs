//! Size estimation for context budgets.
//!
//! Token counts use a character-based heuristic: ~4 characters per token.
//! This approximation is accurate within ~10% for BPE tokenizers on English
//! text, which is enough for budgeting without shipping a tokenizer.

use memloop_config::BudgetUnit;
use memloop_core::message::Message;

/// Per-message overhead for role name, delimiters and formatting markers.
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for a single message including per-message overhead
/// and any tool call payloads.
pub fn estimate_message_tokens(message: &Message) -> usize {
    let tool_calls: usize = message
        .tool_calls
        .iter()
        .map(|tc| estimate_tokens(&tc.name) + estimate_tokens(&tc.arguments))
        .sum();
    MESSAGE_OVERHEAD_TOKENS + estimate_tokens(&message.content) + tool_calls
}

/// Size of `message` in the given unit.
pub fn measure(message: &Message, unit: BudgetUnit) -> usize {
    match unit {
        BudgetUnit::Chars => message.char_len(),
        BudgetUnit::Tokens => estimate_message_tokens(message),
    }
}

/// Size of a slice of messages in the given unit.
pub fn measure_all(messages: &[Message], unit: BudgetUnit) -> usize {
    messages.iter().map(|m| measure(m, unit)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use memloop_core::message::MessageToolCall;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn message_includes_overhead() {
        let msg = Message::user("test"); // 4 chars → 1 token + 4 overhead = 5
        assert_eq!(estimate_message_tokens(&msg), 5);
    }

    #[test]
    fn tool_calls_count_towards_size() {
        let msg = Message::assistant_with_tools(
            "",
            vec![MessageToolCall {
                id: "call_1".into(),
                name: "calculator".into(),             // 10 chars → 3 tokens
                arguments: r#"{"expression":"2+2"}"#.into(), // 20 chars → 5 tokens
            }],
        );
        assert_eq!(estimate_message_tokens(&msg), 4 + 3 + 5);
        assert_eq!(measure(&msg, BudgetUnit::Chars), 30);
    }

    #[test]
    fn chars_unit_counts_characters_not_bytes() {
        let msg = Message::user("héllo");
        assert_eq!(measure(&msg, BudgetUnit::Chars), 5);
    }

    #[test]
    fn measure_all_sums() {
        let msgs = vec![
            Message::user("hello"),      // 5 chars → 2 tokens + 4 overhead = 6
            Message::assistant("world"), // 5 chars → 2 tokens + 4 overhead = 6
        ];
        assert_eq!(measure_all(&msgs, BudgetUnit::Tokens), 12);
        assert_eq!(measure_all(&msgs, BudgetUnit::Chars), 10);
    }
}
