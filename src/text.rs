#![forbid(unsafe_code)]

use rand::seq::SliceRandom;
use rand::Rng;

/// Word pool for synthetic message bodies. Enough variety to defeat
/// trivial server-side deduplication without pulling in a fake-data
/// crate.
const WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "tempor",
    "incididunt", "labore", "dolore", "magna", "aliqua", "enim", "minim", "veniam", "quis",
    "nostrud", "exercitation", "ullamco", "laboris", "nisi", "aliquip", "commodo", "consequat",
    "duis", "aute", "irure", "reprehenderit", "voluptate", "velit", "esse", "cillum", "fugiat",
    "nulla", "pariatur", "excepteur", "sint", "occaecat", "cupidatat", "proident", "sunt", "culpa",
    "officia", "deserunt", "mollit",
];

/// Generates short lorem-style sentences for message payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageGenerator;

impl MessageGenerator {
    pub fn new() -> Self {
        Self
    }

    /// A sentence of 4..=12 words, capitalized and period-terminated,
    /// truncated to `max_chars` characters.
    pub fn message(&self, max_chars: usize) -> String {
        let mut rng = rand::thread_rng();
        let count = rng.gen_range(4..=12);
        let words: Vec<&str> = (0..count)
            .map(|_| WORDS.choose(&mut rng).copied().unwrap_or("lorem"))
            .collect();

        let mut sentence = words.join(" ");
        if let Some(first) = sentence.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        sentence.push('.');
        truncate_chars(&sentence, max_chars)
    }
}

/// Truncate to at most `max_chars` characters (not bytes).
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_respects_max_chars() {
        let generator = MessageGenerator::new();
        for _ in 0..50 {
            let message = generator.message(100);
            assert!(!message.is_empty());
            assert!(message.chars().count() <= 100);
        }
    }

    #[test]
    fn test_tight_cap_truncates() {
        let generator = MessageGenerator::new();
        let message = generator.message(10);
        assert!(message.chars().count() <= 10);
    }

    #[test]
    fn test_truncate_chars_counts_characters() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }
}
