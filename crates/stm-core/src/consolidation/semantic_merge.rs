//! Semantic merge agent (spec §4.8, §4.10 stage 3): collapses a
//! high-cohesion cluster into one new memory that summarizes its sources,
//! instead of mutating a survivor in place.
//!
//! The new memory's content is the highest-scoring member's content with the
//! distinct tokens contributed by the other members appended; its entities
//! and tags are the union of every member's; and its `meta.extra` carries a
//! [`MergeRecord`] naming the sources, how many distinct entities survived,
//! and what each source contributed beyond the base content.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::clock::{new_memory_id, new_relation_id, Clock};
use crate::config::Config;
use crate::consolidation::cluster_detector::{detect_clusters, Cluster, ClusterSuggestion};
use crate::consolidation::{ConsolidationAgent, ItemOutcome};
use crate::error::Result;
use crate::memory::{Memory, MemoryMetadata, MemoryStatus, Relation};
use crate::similarity::tokenize_text;
use crate::storage::Storage;

/// Provenance recorded on a merged memory's `meta.extra["merge_record"]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRecord {
    pub source_ids: Vec<String>,
    pub preserved_entity_count: usize,
    /// Per non-primary source, the distinct content tokens it contributed
    /// that the primary source did not already have.
    pub content_diff: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SemanticMergeAgent;

impl ConsolidationAgent for SemanticMergeAgent {
    type Item = Cluster;

    fn name(&self) -> &'static str {
        "semantic_merge"
    }

    fn scan(&self, storage: &Storage, _clock: &dyn Clock, config: &Config) -> Result<Vec<Cluster>> {
        Ok(detect_clusters(storage, config)
            .into_iter()
            .filter(|c| c.suggestion == ClusterSuggestion::AutoMerge)
            .collect())
    }

    fn process_item(
        &self,
        storage: &Storage,
        clock: &dyn Clock,
        config: &Config,
        cluster: &Cluster,
        dry_run: bool,
    ) -> Result<ItemOutcome> {
        if cluster.memory_ids.len() < 2 {
            return Ok(ItemOutcome::Skipped);
        }

        let now = clock.now_unix();
        let mut members: Vec<Memory> = cluster.memory_ids.iter().filter_map(|id| storage.find_memory(id)).collect();
        if members.len() < 2 {
            return Ok(ItemOutcome::Skipped);
        }

        members.sort_by(|a, b| {
            b.score(now, config.decay_model)
                .partial_cmp(&a.score(now, config.decay_model))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let merged_id = new_memory_id();
        if dry_run {
            return Ok(ItemOutcome::Applied(merged_id));
        }

        let primary = &members[0];
        let others = &members[1..];

        let mut entities: Vec<String> = primary.entities.clone();
        let mut entity_set: HashSet<String> = entities.iter().map(|e| e.to_lowercase()).collect();
        for other in others {
            for entity in &other.entities {
                if entity_set.insert(entity.to_lowercase()) {
                    entities.push(entity.clone());
                }
            }
        }

        let mut tags: Vec<String> = primary.meta.tags.clone();
        let mut tag_set: HashSet<String> = tags.iter().map(|t| t.to_lowercase()).collect();
        for other in others {
            for tag in &other.meta.tags {
                if tag_set.insert(tag.to_lowercase()) {
                    tags.push(tag.clone());
                }
            }
        }

        let primary_tokens: HashSet<String> = tokenize_text(&primary.content).into_iter().collect();
        let mut content_diff = Vec::new();
        let mut merged_content = primary.content.clone();
        for other in others {
            let other_tokens: HashSet<String> = tokenize_text(&other.content).into_iter().collect();
            let mut added: Vec<String> = other_tokens.difference(&primary_tokens).cloned().collect();
            if !added.is_empty() {
                added.sort();
                content_diff.push(added.join(" "));
            }
        }
        if !content_diff.is_empty() {
            merged_content.push_str("\n\nAlso noted: ");
            merged_content.push_str(&content_diff.join("; "));
        }

        let merge_record = MergeRecord {
            source_ids: members.iter().map(|m| m.id.clone()).collect(),
            preserved_entity_count: entities.len(),
            content_diff,
        };

        let mut meta = MemoryMetadata {
            tags,
            source: primary.meta.source.clone(),
            context: primary.meta.context.clone(),
            extra: Default::default(),
        };
        meta.extra.insert("merge_record".to_string(), serde_json::to_value(&merge_record)?);

        let merged_use_count: u64 = members.iter().map(|m| m.use_count).sum();
        let mut merged = Memory::new(merged_id.clone(), merged_content, meta, entities, now)?;
        merged.use_count = merged_use_count;
        merged.last_used = members.iter().map(|m| m.last_used).max().unwrap_or(now);
        merged.strength = members
            .iter()
            .map(|m| m.strength)
            .fold(0.0_f64, f64::max)
            .min(crate::memory::STRENGTH_SOFT_CAP);

        storage.save_memory(merged)?;

        for source in &members {
            storage.update_memory(&source.id, |m| m.status = MemoryStatus::Archived)?;
            storage.create_relation(Relation {
                id: new_relation_id(),
                from_memory_id: source.id.clone(),
                to_memory_id: merged_id.clone(),
                relation_type: "merged_into".into(),
                strength: cluster.cohesion,
                created_at: now,
                metadata: Default::default(),
            })?;
        }

        Ok(ItemOutcome::Applied(merged_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::memory::MemoryMetadata;

    #[test]
    fn merges_cluster_into_new_memory_archiving_all_sources() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::connect(dir.path()).unwrap();

        let mut strong = Memory::new(
            "strong".into(),
            "the user prefers dark mode".into(),
            MemoryMetadata::default(),
            vec!["dark_mode".into()],
            1_000,
        )
        .unwrap();
        for _ in 0..10 {
            strong.touch(1_000, false);
        }
        storage.save_memory(strong).unwrap();

        let mut weak = Memory::new(
            "weak".into(),
            "the user prefers dark mode!".into(),
            MemoryMetadata::default(),
            vec!["ui".into()],
            1_000,
        )
        .unwrap();
        weak.touch(1_000, false);
        storage.save_memory(weak).unwrap();

        let clock = FixedClock::new(1_000);
        let config = Config {
            cluster_link_threshold: 0.5,
            cluster_min_size: 2,
            ..Config::default()
        };

        let agent = SemanticMergeAgent;
        let summary = agent.run(&storage, &clock, &config, false).unwrap();

        assert_eq!(summary.applied, 1);
        assert_eq!(storage.get_memory("strong").unwrap().status, MemoryStatus::Archived);
        assert_eq!(storage.get_memory("weak").unwrap().status, MemoryStatus::Archived);

        let merged_relations = storage.get_relations("strong");
        assert_eq!(merged_relations.len(), 1);
        let merged_id = &merged_relations[0].to_memory_id;

        let merged = storage.get_memory(merged_id).unwrap();
        assert_eq!(merged.status, MemoryStatus::Active);
        assert_eq!(merged.use_count, 11);
        assert!(merged.entities.contains(&"dark_mode".to_string()));
        assert!(merged.entities.contains(&"ui".to_string()));
        assert!(merged.meta.extra.contains_key("merge_record"));
    }

    #[test]
    fn dry_run_does_not_mutate_storage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::connect(dir.path()).unwrap();
        storage
            .save_memory(Memory::new("a".into(), "the user prefers dark mode".into(), MemoryMetadata::default(), vec![], 1_000).unwrap())
            .unwrap();
        storage
            .save_memory(Memory::new("b".into(), "the user prefers dark mode!".into(), MemoryMetadata::default(), vec![], 1_000).unwrap())
            .unwrap();

        let clock = FixedClock::new(1_000);
        let config = Config {
            cluster_link_threshold: 0.5,
            cluster_min_size: 2,
            ..Config::default()
        };

        let agent = SemanticMergeAgent;
        let summary = agent.run(&storage, &clock, &config, true).unwrap();

        assert_eq!(summary.applied, 1);
        assert_eq!(storage.get_memory("a").unwrap().status, MemoryStatus::Active);
        assert_eq!(storage.get_memory("b").unwrap().status, MemoryStatus::Active);
        assert_eq!(storage.count_memories(None), 2);
    }
}
