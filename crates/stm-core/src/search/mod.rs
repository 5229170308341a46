//! Unified search (spec §4.9): merges local STM results with an external
//! vault's results into one ranked, deduplicated list.
//!
//! Grounded in the original's federated search: each source contributes a
//! relevance score in `[0, 1]`, scaled by a per-source weight
//! (`Config::stm_weight` / `Config::ltm_weight`), then results are
//! deduplicated by a normalized content prefix so a memory promoted into the
//! vault does not show up twice.

use crate::config::Config;
use crate::memory::MemoryStatus;
use crate::similarity::text_similarity;
use crate::storage::Storage;
use crate::vault::VaultIndex;

/// Where a [`UnifiedSearchResult`] was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSource {
    Stm,
    Vault,
}

/// One ranked hit from [`search_unified`].
#[derive(Debug, Clone)]
pub struct UnifiedSearchResult {
    pub content: String,
    pub memory_id: Option<String>,
    pub score: f64,
    pub source: ResultSource,
}

/// Length of the lowercased, trimmed content prefix used to deduplicate
/// results across sources.
const DEDUP_PREFIX_LEN: usize = 100;

fn dedup_key(content: &str) -> String {
    let trimmed = content.trim().to_lowercase();
    trimmed.chars().take(DEDUP_PREFIX_LEN).collect()
}

/// Search local storage and, if configured, the vault, merging and
/// weighting results by `Config::stm_weight`/`Config::ltm_weight`.
pub fn search_unified(storage: &Storage, vault: &dyn VaultIndex, config: &Config, query: &str, limit: usize) -> crate::error::Result<Vec<UnifiedSearchResult>> {
    let mut stm_hits: Vec<UnifiedSearchResult> = storage
        .list_memories(Some(MemoryStatus::Active), None, 0)
        .into_iter()
        .filter_map(|m| {
            let similarity = text_similarity(query, &m.content);
            (similarity > 0.0).then(|| UnifiedSearchResult {
                content: m.content,
                memory_id: Some(m.id),
                score: similarity * config.stm_weight,
                source: ResultSource::Stm,
            })
        })
        .collect();
    stm_hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    stm_hits.truncate(limit);

    let vault_hits: Vec<UnifiedSearchResult> = vault
        .search(query, limit)?
        .into_iter()
        .map(|(content, score)| UnifiedSearchResult {
            content,
            memory_id: None,
            score: score * config.ltm_weight,
            source: ResultSource::Vault,
        })
        .collect();

    let mut seen = std::collections::HashSet::new();
    let mut merged: Vec<UnifiedSearchResult> = Vec::new();
    for hit in stm_hits.into_iter().chain(vault_hits) {
        if seen.insert(dedup_key(&hit.content)) {
            merged.push(hit);
        }
    }

    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(limit);
    Ok(merged)
}
