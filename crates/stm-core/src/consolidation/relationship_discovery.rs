//! Relationship discovery agent (spec §4.10 stage 5): links memories that
//! share enough entities to plausibly be about the same topic, so spreading
//! activation has edges to walk beyond what callers explicitly recorded.

use crate::clock::Clock;
use crate::config::Config;
use crate::consolidation::{ConsolidationAgent, ItemOutcome};
use crate::error::Result;
use crate::memory::{Memory, MemoryStatus, Relation};
use crate::similarity::text_similarity;
use crate::storage::Storage;
use std::collections::HashSet;

/// An unordered pair of memory ids considered for a new relation.
#[derive(Debug, Clone)]
pub struct CandidatePair {
    pub a: String,
    pub b: String,
}

fn shared_entity_count(a: &Memory, b: &Memory) -> usize {
    let set_a: HashSet<&String> = a.entities.iter().collect();
    let set_b: HashSet<&String> = b.entities.iter().collect();
    set_a.intersection(&set_b).count()
}

fn confidence(a: &Memory, b: &Memory) -> f64 {
    let entity_overlap = {
        let set_a: HashSet<String> = a.entities.iter().map(|e| e.to_lowercase()).collect();
        let set_b: HashSet<String> = b.entities.iter().map(|e| e.to_lowercase()).collect();
        if set_a.is_empty() || set_b.is_empty() {
            0.0
        } else {
            set_a.intersection(&set_b).count() as f64 / set_a.union(&set_b).count() as f64
        }
    };
    let content_similarity = text_similarity(&a.content, &b.content);
    0.6 * entity_overlap + 0.4 * content_similarity
}

#[derive(Debug, Default)]
pub struct RelationshipDiscoveryAgent;

impl ConsolidationAgent for RelationshipDiscoveryAgent {
    type Item = CandidatePair;

    fn name(&self) -> &'static str {
        "relationship_discovery"
    }

    fn scan(&self, storage: &Storage, _clock: &dyn Clock, config: &Config) -> Result<Vec<CandidatePair>> {
        let memories = storage.list_memories(Some(MemoryStatus::Active), None, 0);
        let existing_pairs: HashSet<(String, String)> = storage
            .get_all_relations()
            .into_iter()
            .map(|r| ordered_pair(r.from_memory_id, r.to_memory_id))
            .collect();

        let mut pairs = Vec::new();
        for i in 0..memories.len() {
            for j in (i + 1)..memories.len() {
                let a = &memories[i];
                let b = &memories[j];
                if shared_entity_count(a, b) < config.min_shared_entities {
                    continue;
                }
                let pair = ordered_pair(a.id.clone(), b.id.clone());
                if existing_pairs.contains(&pair) {
                    continue;
                }
                pairs.push(CandidatePair { a: pair.0, b: pair.1 });
            }
        }
        Ok(pairs)
    }

    fn process_item(
        &self,
        storage: &Storage,
        clock: &dyn Clock,
        config: &Config,
        pair: &CandidatePair,
        dry_run: bool,
    ) -> Result<ItemOutcome> {
        let (Some(a), Some(b)) = (storage.find_memory(&pair.a), storage.find_memory(&pair.b)) else {
            return Ok(ItemOutcome::Skipped);
        };

        let score = confidence(&a, &b);
        if score < config.min_confidence {
            return Ok(ItemOutcome::Skipped);
        }

        if dry_run {
            return Ok(ItemOutcome::Applied(pair.a.clone()));
        }

        storage.create_relation(Relation {
            id: crate::clock::new_relation_id(),
            from_memory_id: pair.a.clone(),
            to_memory_id: pair.b.clone(),
            relation_type: "related_to".into(),
            strength: score,
            created_at: clock.now_unix(),
            metadata: Default::default(),
        })?;

        Ok(ItemOutcome::Applied(pair.a.clone()))
    }
}

fn ordered_pair(a: String, b: String) -> (String, String) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::memory::MemoryMetadata;

    fn memory_with_entities(id: &str, content: &str, entities: Vec<&str>) -> Memory {
        Memory::new(id.into(), content.into(), MemoryMetadata::default(), entities.into_iter().map(String::from).collect(), 1_000).unwrap()
    }

    #[test]
    fn links_memories_sharing_enough_entities() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::connect(dir.path()).unwrap();
        storage.save_memory(memory_with_entities("a", "Acme project kickoff with Jane", vec!["Acme", "Jane"])).unwrap();
        storage.save_memory(memory_with_entities("b", "Acme project follow-up with Jane", vec!["Acme", "Jane"])).unwrap();

        let clock = FixedClock::new(1_000);
        let config = Config {
            min_shared_entities: 2,
            min_confidence: 0.1,
            ..Config::default()
        };

        let agent = RelationshipDiscoveryAgent;
        let summary = agent.run(&storage, &clock, &config, false).unwrap();

        assert_eq!(summary.applied, 1);
        assert_eq!(storage.get_all_relations().len(), 1);
    }

    #[test]
    fn does_not_duplicate_existing_relation() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::connect(dir.path()).unwrap();
        storage.save_memory(memory_with_entities("a", "Acme project kickoff", vec!["Acme", "Jane"])).unwrap();
        storage.save_memory(memory_with_entities("b", "Acme project follow-up", vec!["Acme", "Jane"])).unwrap();
        storage
            .create_relation(Relation {
                id: "existing".into(),
                from_memory_id: "a".into(),
                to_memory_id: "b".into(),
                relation_type: "related_to".into(),
                strength: 0.5,
                created_at: 1_000,
                metadata: Default::default(),
            })
            .unwrap();

        let clock = FixedClock::new(1_000);
        let config = Config {
            min_shared_entities: 2,
            min_confidence: 0.1,
            ..Config::default()
        };

        let agent = RelationshipDiscoveryAgent;
        let summary = agent.run(&storage, &clock, &config, false).unwrap();
        assert_eq!(summary.scanned, 0);
        assert_eq!(storage.get_all_relations().len(), 1);
    }
}
