//! Snippet extraction for automatic memory saving.

/// Decides which facts of a finished exchange are worth remembering.
pub trait SnippetExtractor: Send + Sync {
    fn extract(&self, user_message: &str, answer: &str) -> Vec<String>;
}

/// Minimum length of both sides for an exchange to be summarized.
pub const MIN_EXCHANGE_CHARS: usize = 10;

/// Stores the exchange itself as one snippet, skipping short small talk.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExchangeSummary;

impl SnippetExtractor for ExchangeSummary {
    fn extract(&self, user_message: &str, answer: &str) -> Vec<String> {
        let user_message = user_message.trim();
        let answer = answer.trim();
        if user_message.chars().count() < MIN_EXCHANGE_CHARS || answer.chars().count() < MIN_EXCHANGE_CHARS {
            return Vec::new();
        }
        vec![format!("User asked: {user_message}\nAssistant answered: {answer}")]
    }
}
