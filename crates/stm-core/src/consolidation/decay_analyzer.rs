//! Decay analysis agent (spec §4.10 stage 1): archives memories whose
//! current score has fallen at or below `forget_threshold`.
//!
//! Grounded in the original's decay-driven garbage collection: scoring is
//! pure and cheap, so this agent simply recomputes every active memory's
//! score against the configured model and acts on the ones below threshold.

use crate::clock::Clock;
use crate::config::Config;
use crate::consolidation::{ConsolidationAgent, ItemOutcome};
use crate::error::Result;
use crate::memory::MemoryStatus;
use crate::storage::Storage;

#[derive(Debug, Default)]
pub struct DecayAnalyzer;

impl ConsolidationAgent for DecayAnalyzer {
    type Item = String;

    fn name(&self) -> &'static str {
        "decay_analyzer"
    }

    fn scan(&self, storage: &Storage, clock: &dyn Clock, config: &Config) -> Result<Vec<String>> {
        let now = clock.now_unix();
        Ok(storage
            .list_memories(Some(MemoryStatus::Active), None, 0)
            .into_iter()
            .filter(|m| m.score(now, config.decay_model) <= config.thresholds.forget_threshold)
            .map(|m| m.id)
            .collect())
    }

    fn process_item(
        &self,
        storage: &Storage,
        _clock: &dyn Clock,
        _config: &Config,
        id: &String,
        dry_run: bool,
    ) -> Result<ItemOutcome> {
        let Some(memory) = storage.find_memory(id) else {
            return Ok(ItemOutcome::Skipped);
        };
        if memory.status != MemoryStatus::Active {
            return Ok(ItemOutcome::Skipped);
        }

        if !dry_run {
            storage.update_memory(id, |m| {
                m.status = MemoryStatus::Archived;
            })?;
        }

        Ok(ItemOutcome::Applied(id.clone()))
    }
}

/// Garbage-collection result for a single pass: ids archived (or that would
/// be, under `dry_run`).
#[derive(Debug, Clone, Default)]
pub struct GarbageCollectionResult {
    pub archived_ids: Vec<String>,
    pub dry_run: bool,
}

impl DecayAnalyzer {
    /// Run and return the concrete set of affected ids, for callers that
    /// want more than the aggregate [`crate::consolidation::AgentSummary`].
    pub fn collect(&self, storage: &Storage, clock: &dyn Clock, config: &Config, dry_run: bool) -> Result<GarbageCollectionResult> {
        let ids = self.scan(storage, clock, config)?;
        let mut archived = Vec::new();
        for id in &ids {
            if let ItemOutcome::Applied(id) = self.process_item(storage, clock, config, id, dry_run)? {
                archived.push(id);
            }
        }
        Ok(GarbageCollectionResult {
            archived_ids: archived,
            dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::decay::DecayModel;
    use crate::memory::{Memory, MemoryMetadata};

    fn make(storage: &Storage, id: &str, use_count: u64, last_used: i64) {
        let mut m = Memory::new(id.into(), "content".into(), MemoryMetadata::default(), vec![], last_used).unwrap();
        for _ in 0..use_count {
            m.touch(last_used, false);
        }
        storage.save_memory(m).unwrap();
    }

    #[test]
    fn archives_memories_below_forget_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::connect(dir.path()).unwrap();
        make(&storage, "stale", 1, 0);
        make(&storage, "fresh", 5, 1_000_000);

        let clock = FixedClock::new(1_000_000);
        let config = Config {
            decay_model: DecayModel::Exponential { beta: 0.6, lambda: crate::decay::calculate_decay_lambda(0.01) },
            ..Config::default()
        };

        let agent = DecayAnalyzer;
        let result = agent.collect(&storage, &clock, &config, false).unwrap();

        assert!(result.archived_ids.contains(&"stale".to_string()));
        assert_eq!(storage.get_memory("stale").unwrap().status, MemoryStatus::Archived);
        assert_eq!(storage.get_memory("fresh").unwrap().status, MemoryStatus::Active);
    }

    #[test]
    fn dry_run_does_not_mutate_storage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::connect(dir.path()).unwrap();
        make(&storage, "stale", 1, 0);

        let clock = FixedClock::new(1_000_000);
        let config = Config {
            decay_model: DecayModel::Exponential { beta: 0.6, lambda: crate::decay::calculate_decay_lambda(0.01) },
            ..Config::default()
        };

        let agent = DecayAnalyzer;
        let result = agent.collect(&storage, &clock, &config, true).unwrap();

        assert!(result.dry_run);
        assert!(result.archived_ids.contains(&"stale".to_string()));
        assert_eq!(storage.get_memory("stale").unwrap().status, MemoryStatus::Active);
    }
}
