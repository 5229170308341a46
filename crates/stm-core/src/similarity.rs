//! Similarity metrics for clustering, search, and duplicate detection (spec §4.2)

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Returned when two vectors passed to [`cosine_similarity`] have mismatched length.
#[derive(Debug, Clone, thiserror::Error)]
#[error("vectors must have the same length (got {lhs} and {rhs})")]
pub struct LengthMismatch {
    lhs: usize,
    rhs: usize,
}

/// Cosine similarity between two equal-length vectors. Returns `0.0` when
/// either vector has zero magnitude.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Result<f64, LengthMismatch> {
    if a.len() != b.len() {
        return Err(LengthMismatch {
            lhs: a.len(),
            rhs: b.len(),
        });
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot / (mag_a * mag_b))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Tokenize text: lowercase, strip everything outside `[^\w\s]`, split on
/// whitespace, drop tokens of length `<= 2`.
pub fn tokenize_text(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if is_word_char(c) || c.is_whitespace() { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() > 2)
        .map(|t| t.to_string())
        .collect()
}

/// Term frequency: `count / total` per token.
pub fn compute_tf(tokens: &[String]) -> HashMap<String, f64> {
    if tokens.is_empty() {
        return HashMap::new();
    }
    let total = tokens.len() as f64;
    let mut counts: HashMap<String, f64> = HashMap::new();
    for t in tokens {
        *counts.entry(t.clone()).or_insert(0.0) += 1.0;
    }
    for v in counts.values_mut() {
        *v /= total;
    }
    counts
}

/// Inverse document frequency across a tokenized corpus: `ln(N / df)`.
pub fn compute_idf(documents: &[Vec<String>]) -> HashMap<String, f64> {
    if documents.is_empty() {
        return HashMap::new();
    }
    let num_docs = documents.len() as f64;
    let mut doc_freq: HashMap<String, u64> = HashMap::new();
    for doc in documents {
        let unique: HashSet<&String> = doc.iter().collect();
        for term in unique {
            *doc_freq.entry(term.clone()).or_insert(0) += 1;
        }
    }
    doc_freq
        .into_iter()
        .map(|(term, freq)| (term, (num_docs / freq as f64).ln()))
        .collect()
}

/// TF-IDF cosine similarity between two texts. Falls back to a synthetic
/// 2-document corpus `[tokens1, tokens2]` when no corpus is supplied.
pub fn tfidf_similarity(text1: &str, text2: &str, idf_scores: Option<&HashMap<String, f64>>) -> f64 {
    let tokens1 = tokenize_text(text1);
    let tokens2 = tokenize_text(text2);

    if tokens1.is_empty() || tokens2.is_empty() {
        return 0.0;
    }

    let tf1 = compute_tf(&tokens1);
    let tf2 = compute_tf(&tokens2);

    let owned_idf;
    let idf = match idf_scores {
        Some(idf) => idf,
        None => {
            owned_idf = compute_idf(&[tokens1.clone(), tokens2.clone()]);
            &owned_idf
        }
    };

    let mut all_terms: HashSet<&String> = HashSet::new();
    all_terms.extend(tf1.keys());
    all_terms.extend(tf2.keys());

    let vec1: Vec<f64> = all_terms
        .iter()
        .map(|t| tf1.get(*t).copied().unwrap_or(0.0) * idf.get(*t).copied().unwrap_or(0.0))
        .collect();
    let vec2: Vec<f64> = all_terms
        .iter()
        .map(|t| tf2.get(*t).copied().unwrap_or(0.0) * idf.get(*t).copied().unwrap_or(0.0))
        .collect();

    cosine_similarity(&vec1, &vec2).unwrap_or(0.0)
}

/// Jaccard similarity between two token sets. Returns `0.0` when either set
/// is empty.
pub fn jaccard_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Public text similarity: Jaccard on tokenized sets, chosen over TF-IDF
/// because it does not degenerate to zero on identical short documents.
pub fn text_similarity(text1: &str, text2: &str) -> f64 {
    let a: HashSet<String> = tokenize_text(text1).into_iter().collect();
    let b: HashSet<String> = tokenize_text(text2).into_iter().collect();
    jaccard_similarity(&a, &b)
}

/// Element-wise mean of a list of equal-length vectors.
pub fn calculate_centroid(embeddings: &[Vec<f64>]) -> Vec<f64> {
    let Some(first) = embeddings.first() else {
        return Vec::new();
    };
    let dim = first.len();
    let mut centroid = vec![0.0; dim];
    for embed in embeddings {
        for (i, val) in embed.iter().enumerate() {
            centroid[i] += val;
        }
    }
    let n = embeddings.len() as f64;
    for v in centroid.iter_mut() {
        *v /= n;
    }
    centroid
}

/// Lazily-built English stopword set shared by [`crate::nlp`] and similarity
/// helpers that need to drop filler words before comparison.
pub fn stopwords() -> &'static HashSet<&'static str> {
    static STOPWORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    STOPWORDS.get_or_init(|| {
        crate::nlp::DEFAULT_STOPWORDS.iter().copied().collect()
    })
}
