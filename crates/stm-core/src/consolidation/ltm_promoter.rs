//! Long-term-memory promotion agent (spec §4.10 stage 4): copies memories
//! that have earned durability into the external vault.
//!
//! A memory is eligible when its current score clears `promote_threshold`,
//! OR it has been used `promote_use_count` times within
//! `promote_time_window_days`. Promotion writes through [`VaultSink`] and
//! marks the memory `Promoted` so it stops competing for activation slots
//! (spec §3: `promoted` is terminal short of archival).

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::Config;
use crate::consolidation::{ConsolidationAgent, ItemOutcome};
use crate::decay::SECONDS_PER_DAY;
use crate::error::Result;
use crate::memory::MemoryStatus;
use crate::storage::Storage;
use crate::vault::VaultSink;

pub struct LtmPromoter {
    vault: Arc<dyn VaultSink>,
}

impl LtmPromoter {
    pub fn new(vault: Arc<dyn VaultSink>) -> Self {
        Self { vault }
    }

    fn is_eligible(memory: &crate::memory::Memory, config: &Config, now: i64) -> bool {
        let score = memory.score(now, config.decay_model);
        if score >= config.thresholds.promote_threshold {
            return true;
        }
        let window_secs = (config.thresholds.promote_time_window_days * SECONDS_PER_DAY) as i64;
        memory.use_count >= config.thresholds.promote_use_count && (now - memory.created_at) <= window_secs
    }
}

impl ConsolidationAgent for LtmPromoter {
    type Item = String;

    fn name(&self) -> &'static str {
        "ltm_promoter"
    }

    fn scan(&self, storage: &Storage, clock: &dyn Clock, config: &Config) -> Result<Vec<String>> {
        let now = clock.now_unix();
        Ok(storage
            .list_memories(Some(MemoryStatus::Active), None, 0)
            .into_iter()
            .filter(|m| Self::is_eligible(m, config, now))
            .map(|m| m.id)
            .collect())
    }

    fn process_item(
        &self,
        storage: &Storage,
        clock: &dyn Clock,
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

        if dry_run {
            return Ok(ItemOutcome::Applied(id.clone()));
        }

        let vault_id = self.vault.write(&memory)?;
        let now = clock.now_unix();
        storage.update_memory(id, |m| {
            m.status = MemoryStatus::Promoted;
            m.promoted_at = Some(now);
            m.promoted_to = Some(vault_id.clone());
        })?;

        Ok(ItemOutcome::Applied(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::memory::{Memory, MemoryMetadata};
    use crate::vault::NullVaultSink;

    struct StubVault;
    impl VaultSink for StubVault {
        fn write(&self, memory: &crate::memory::Memory) -> Result<String> {
            Ok(format!("vault://{}", memory.id))
        }
    }

    #[test]
    fn promotes_high_score_memory_and_writes_through_vault() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::connect(dir.path()).unwrap();
        let mut memory = Memory::new("m1".into(), "content".into(), MemoryMetadata::default(), vec![], 1_000).unwrap();
        memory.touch(1_000, false);
        storage.save_memory(memory).unwrap();

        let clock = FixedClock::new(1_000);
        let config = Config::default();
        let agent = LtmPromoter::new(Arc::new(StubVault));

        let summary = agent.run(&storage, &clock, &config, false).unwrap();
        assert_eq!(summary.applied, 1);

        let promoted = storage.get_memory("m1").unwrap();
        assert_eq!(promoted.status, MemoryStatus::Promoted);
        assert_eq!(promoted.promoted_to, Some("vault://m1".to_string()));
    }

    #[test]
    fn no_vault_configured_surfaces_dependency_error_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::connect(dir.path()).unwrap();
        let mut memory = Memory::new("m1".into(), "content".into(), MemoryMetadata::default(), vec![], 1_000).unwrap();
        memory.touch(1_000, false);
        storage.save_memory(memory).unwrap();

        let clock = FixedClock::new(1_000);
        let config = Config::default();
        let agent = LtmPromoter::new(Arc::new(NullVaultSink));

        let summary = agent.run(&storage, &clock, &config, false).unwrap();
        assert_eq!(summary.errors, 1);
        assert_eq!(storage.get_memory("m1").unwrap().status, MemoryStatus::Active);
    }
}
