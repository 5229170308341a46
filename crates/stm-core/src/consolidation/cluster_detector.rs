//! Clustering (spec §4.8, §4.10 stage 2): groups similar active memories so
//! the merge and promotion stages can act on a cluster rather than a pair,
//! and separately flags pairwise near-duplicates.
//!
//! Grounded in the original's greedy single-link clustering over cosine
//! similarity of embeddings, falling back to Jaccard over tokenized content
//! when a memory has no embedding — this crate only ever has the latter.

use crate::clock::Clock;
use crate::config::Config;
use crate::consolidation::{ConsolidationAgent, ItemOutcome};
use crate::error::Result;
use crate::memory::{Memory, MemoryStatus};
use crate::similarity::text_similarity;
use crate::storage::Storage;

/// Cohesion at or above this fraction means a cluster is safe to merge
/// without review (spec §4.8).
pub const AUTO_MERGE_COHESION: f64 = 0.90;
/// Cohesion at or above this fraction (but below [`AUTO_MERGE_COHESION`])
/// means a cluster should be surfaced for review before merging.
pub const LLM_REVIEW_COHESION: f64 = 0.75;

/// What a cluster's cohesion suggests should happen to it (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterSuggestion {
    /// Cohesion is high enough to merge without a review step.
    AutoMerge,
    /// Cohesion is high enough to be worth a review before merging.
    LlmReview,
    /// Cohesion is too low; the members are kept separate.
    KeepSeparate,
}

fn suggestion_for(cohesion: f64) -> ClusterSuggestion {
    if cohesion >= AUTO_MERGE_COHESION {
        ClusterSuggestion::AutoMerge
    } else if cohesion >= LLM_REVIEW_COHESION {
        ClusterSuggestion::LlmReview
    } else {
        ClusterSuggestion::KeepSeparate
    }
}

/// A group of memories found similar enough to link (spec §4.8).
#[derive(Debug, Clone)]
pub struct Cluster {
    pub memory_ids: Vec<String>,
    /// Mean pairwise similarity across every member, not just to the seed.
    pub cohesion: f64,
    pub suggestion: ClusterSuggestion,
}

/// A pairwise near-duplicate: two active memories whose content similarity
/// meets `duplicate_threshold`, independent of clustering (spec §4.8
/// `find_duplicates`).
#[derive(Debug, Clone)]
pub struct DuplicatePair {
    pub a: String,
    pub b: String,
    pub similarity: f64,
}

/// Greedy single-link clustering: each unclustered memory seeds a new
/// cluster and pulls in every other unclustered memory similar enough to any
/// current member, until the cluster reaches `cluster_max_size`. Clusters
/// below `cluster_min_size` are dropped. Cohesion is then recomputed as the
/// mean of every pairwise similarity within the final membership.
pub fn detect_clusters(storage: &Storage, config: &Config) -> Vec<Cluster> {
    let memories = storage.list_memories(Some(MemoryStatus::Active), None, 0);
    detect_clusters_over(&memories, config)
}

fn detect_clusters_over(memories: &[Memory], config: &Config) -> Vec<Cluster> {
    let mut unclustered: Vec<&Memory> = memories.iter().collect();
    let mut clusters = Vec::new();

    while let Some(seed) = unclustered.first().copied() {
        let mut members = vec![seed];
        unclustered.remove(0);

        let mut i = 0;
        while i < unclustered.len() && members.len() < config.cluster_max_size {
            let candidate = unclustered[i];
            let links_to_any = members
                .iter()
                .any(|m| text_similarity(&m.content, &candidate.content) >= config.cluster_link_threshold);
            if links_to_any {
                members.push(candidate);
                unclustered.remove(i);
            } else {
                i += 1;
            }
        }

        if members.len() >= config.cluster_min_size {
            let cohesion = mean_pairwise_similarity(&members);
            clusters.push(Cluster {
                memory_ids: members.iter().map(|m| m.id.clone()).collect(),
                cohesion,
                suggestion: suggestion_for(cohesion),
            });
        }
    }

    clusters
}

fn mean_pairwise_similarity(members: &[&Memory]) -> f64 {
    if members.len() < 2 {
        return 1.0;
    }
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..members.len() {
        for j in (i + 1)..members.len() {
            total += text_similarity(&members[i].content, &members[j].content);
            pairs += 1;
        }
    }
    total / pairs as f64
}

/// Every pair of active memories whose content similarity meets
/// `config.duplicate_threshold`, scanned independently of clustering.
pub fn find_duplicates(storage: &Storage, config: &Config) -> Vec<DuplicatePair> {
    let memories = storage.list_memories(Some(MemoryStatus::Active), None, 0);
    let mut pairs = Vec::new();
    for i in 0..memories.len() {
        for j in (i + 1)..memories.len() {
            let similarity = text_similarity(&memories[i].content, &memories[j].content);
            if similarity >= config.duplicate_threshold {
                pairs.push(DuplicatePair {
                    a: memories[i].id.clone(),
                    b: memories[j].id.clone(),
                    similarity,
                });
            }
        }
    }
    pairs
}

/// Consolidation-agent wrapper around [`detect_clusters`] (spec §4.10 stage
/// 2). Detection only: clustering never mutates storage itself, it just
/// classifies groups for [`crate::consolidation::semantic_merge`] to act on.
#[derive(Debug, Default)]
pub struct ClusterDetector;

impl ConsolidationAgent for ClusterDetector {
    type Item = Cluster;

    fn name(&self) -> &'static str {
        "cluster_detector"
    }

    fn scan(&self, storage: &Storage, _clock: &dyn Clock, config: &Config) -> Result<Vec<Cluster>> {
        Ok(detect_clusters(storage, config))
    }

    fn process_item(
        &self,
        _storage: &Storage,
        _clock: &dyn Clock,
        _config: &Config,
        cluster: &Cluster,
        _dry_run: bool,
    ) -> Result<ItemOutcome> {
        match cluster.suggestion {
            ClusterSuggestion::KeepSeparate => Ok(ItemOutcome::Skipped),
            _ => Ok(ItemOutcome::Applied(cluster.memory_ids.join(","))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryMetadata;

    fn memory(id: &str, content: &str) -> Memory {
        Memory::new(id.into(), content.into(), MemoryMetadata::default(), vec![], 1_000).unwrap()
    }

    #[test]
    fn groups_near_duplicate_content_into_one_cluster() {
        let memories = vec![
            memory("a", "the user prefers dark mode in the editor"),
            memory("b", "the user prefers dark mode in the editor settings"),
            memory("c", "completely unrelated note about lunch plans"),
        ];
        let config = Config {
            cluster_link_threshold: 0.5,
            cluster_min_size: 2,
            ..Config::default()
        };

        let clusters = detect_clusters_over(&memories, &config);
        assert_eq!(clusters.len(), 1);
        assert!(clusters[0].memory_ids.contains(&"a".to_string()));
        assert!(clusters[0].memory_ids.contains(&"b".to_string()));
    }

    #[test]
    fn singleton_groups_are_dropped_below_min_size() {
        let memories = vec![memory("a", "alpha"), memory("b", "completely different content here")];
        let config = Config {
            cluster_link_threshold: 0.9,
            cluster_min_size: 2,
            ..Config::default()
        };
        let clusters = detect_clusters_over(&memories, &config);
        assert!(clusters.is_empty());
    }

    #[test]
    fn cohesion_is_mean_pairwise_not_seed_only() {
        let memories = vec![
            memory("a", "alpha beta gamma delta"),
            memory("b", "alpha beta gamma epsilon"),
            memory("c", "alpha beta zeta eta"),
        ];
        let config = Config {
            cluster_link_threshold: 0.3,
            cluster_min_size: 2,
            ..Config::default()
        };
        let clusters = detect_clusters_over(&memories, &config);
        assert_eq!(clusters.len(), 1);
        let cluster = &clusters[0];
        let sim_ab = text_similarity(&memories[0].content, &memories[1].content);
        let sim_ac = text_similarity(&memories[0].content, &memories[2].content);
        let sim_bc = text_similarity(&memories[1].content, &memories[2].content);
        let expected = (sim_ab + sim_ac + sim_bc) / 3.0;
        assert!((cluster.cohesion - expected).abs() < 1e-9);
    }

    #[test]
    fn high_cohesion_suggests_auto_merge() {
        let memories = vec![memory("a", "alpha beta gamma"), memory("b", "alpha beta gamma")];
        let config = Config {
            cluster_link_threshold: 0.5,
            cluster_min_size: 2,
            ..Config::default()
        };
        let clusters = detect_clusters_over(&memories, &config);
        assert_eq!(clusters[0].suggestion, ClusterSuggestion::AutoMerge);
    }

    #[test]
    fn find_duplicates_returns_pairs_at_or_above_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::connect(dir.path()).unwrap();
        storage.save_memory(memory("a", "the user prefers dark mode in the editor")).unwrap();
        storage.save_memory(memory("b", "the user prefers dark mode in the editor today")).unwrap();
        storage.save_memory(memory("c", "completely unrelated note")).unwrap();

        let config = Config { duplicate_threshold: 0.5, ..Config::default() };
        let pairs = find_duplicates(&storage, &config);
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].similarity >= 0.5);
    }
}
