//! Keyword extraction (spec §4.3)
//!
//! A RAKE-style (Rapid Automatic Keyword Extraction) implementation: split
//! text into candidate phrases at stopwords and punctuation, score each word
//! by `degree(word) / frequency(word)`, score each phrase as the sum of its
//! words' scores, and rank phrases descending. Multi-word technical phrases
//! ("typescript project") tend to outrank their component words because
//! co-occurrence inflates `degree`.

use std::collections::HashMap;

/// A compact English stopword list covering the closed-class words RAKE is
/// meant to split candidate phrases on. Not exhaustive — sized for
/// conversational assistant messages, not general corpora.
pub const DEFAULT_STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "aren't", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few",
    "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its",
    "itself", "just", "me", "might", "more", "most", "must", "my", "myself", "need", "no", "nor",
    "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves",
    "out", "over", "own", "please", "same", "she", "should", "so", "some", "such", "than",
    "that", "the", "their", "theirs", "them", "themselves", "then", "there", "these", "they",
    "this", "those", "through", "to", "too", "under", "until", "up", "very", "was", "we", "were",
    "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with", "would",
    "you", "your", "yours", "yourself", "yourselves", "me", "help", "set", "new", "want", "like",
];

fn is_delimiter(c: char) -> bool {
    !c.is_alphanumeric() && c != '_' && c != '-'
}

fn split_into_words(phrase_text: &str) -> Vec<String> {
    phrase_text
        .split(|c: char| is_delimiter(c) && c != ' ')
        .flat_map(|chunk| chunk.split_whitespace())
        .map(|w| w.trim_matches('-').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Extracts ranked multi-word phrases from free text, used both to build
/// content keyword postings ([`crate::activation::index`]) and to extract
/// query keywords in the activation hot path.
///
/// Safe to reuse across calls: holds no per-call state.
#[derive(Debug, Clone, Default)]
pub struct KeywordExtractor {
    stopwords: Vec<String>,
}

impl KeywordExtractor {
    /// Build an extractor using the default stopword list.
    pub fn new() -> Self {
        Self {
            stopwords: DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Build an extractor with a caller-supplied stopword list (already lowercased).
    pub fn with_stopwords(stopwords: Vec<String>) -> Self {
        Self { stopwords }
    }

    fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.iter().any(|s| s == word)
    }

    /// Split `message` into candidate phrases: runs of non-stopword words,
    /// broken at stopwords and sentence punctuation.
    fn candidate_phrases(&self, message: &str) -> Vec<Vec<String>> {
        let words = split_into_words(message);
        let mut phrases = Vec::new();
        let mut current: Vec<String> = Vec::new();

        for word in words {
            if word.is_empty() {
                continue;
            }
            if self.is_stopword(&word) {
                if !current.is_empty() {
                    phrases.push(std::mem::take(&mut current));
                }
            } else {
                current.push(word);
            }
        }
        if !current.is_empty() {
            phrases.push(current);
        }

        phrases
    }

    /// Extract at most `max_keywords` ranked phrases from `message`.
    /// Returns `[]` for empty or whitespace-only input.
    pub fn extract_keywords(&self, message: &str, max_keywords: usize) -> Vec<String> {
        if message.trim().is_empty() {
            return Vec::new();
        }

        let phrases = self.candidate_phrases(message);
        if phrases.is_empty() {
            return Vec::new();
        }

        // RAKE word scoring: degree(word) = sum of (phrase_len - 1) co-occurrences
        // plus its own frequency; freq(word) = occurrence count; score = degree/freq.
        let mut freq: HashMap<String, f64> = HashMap::new();
        let mut degree: HashMap<String, f64> = HashMap::new();

        for phrase in &phrases {
            let phrase_len = phrase.len() as f64;
            for word in phrase {
                *freq.entry(word.clone()).or_insert(0.0) += 1.0;
                *degree.entry(word.clone()).or_insert(0.0) += phrase_len;
            }
        }

        let word_score = |word: &str| -> f64 {
            let f = freq.get(word).copied().unwrap_or(1.0);
            let d = degree.get(word).copied().unwrap_or(f);
            d / f
        };

        let mut scored_phrases: Vec<(String, f64)> = phrases
            .iter()
            .map(|phrase| {
                let score: f64 = phrase.iter().map(|w| word_score(w)).sum();
                (phrase.join(" "), score)
            })
            .collect();

        // Deterministic ranking: score descending, ties broken lexicographically
        // so repeated calls on the same input always return the same order.
        scored_phrases.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut seen = std::collections::HashSet::new();
        scored_phrases
            .into_iter()
            .filter(|(phrase, _)| seen.insert(phrase.clone()))
            .take(max_keywords)
            .map(|(phrase, _)| phrase)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_returns_empty() {
        let extractor = KeywordExtractor::new();
        assert!(extractor.extract_keywords("", 20).is_empty());
        assert!(extractor.extract_keywords("   \n\t", 20).is_empty());
    }

    #[test]
    fn preserves_multi_word_technical_phrases() {
        let extractor = KeywordExtractor::new();
        let keywords = extractor.extract_keywords(
            "Help me set up a new web project with TypeScript",
            20,
        );
        assert!(
            keywords.iter().any(|k| k.contains("typescript")),
            "expected a typescript phrase in {keywords:?}"
        );
    }

    #[test]
    fn respects_max_keywords() {
        let extractor = KeywordExtractor::new();
        let keywords = extractor.extract_keywords(
            "typescript project react framework postgresql database redis cache docker container",
            3,
        );
        assert!(keywords.len() <= 3);
    }

    #[test]
    fn is_deterministic_across_repeated_calls() {
        let extractor = KeywordExtractor::new();
        let msg = "I prefer TypeScript over JavaScript for new projects";
        let first = extractor.extract_keywords(msg, 10);
        let second = extractor.extract_keywords(msg, 10);
        assert_eq!(first, second);
    }

    #[test]
    fn no_residual_state_across_calls() {
        let extractor = KeywordExtractor::new();
        let _ = extractor.extract_keywords("PostgreSQL database migration", 10);
        let second = extractor.extract_keywords("typescript project setup", 10);
        assert!(second.iter().any(|k| k.contains("typescript")));
        assert!(!second.iter().any(|k| k.contains("postgresql")));
    }
}
