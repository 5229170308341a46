//! Consolidation agents (spec §4.10): scheduled background passes that keep
//! the store small and the relation graph populated without blocking the
//! activation hot path.
//!
//! Grounded in the original's `agents/scheduler.py`: every agent shares a
//! `scan -> process_item` contract, runs with per-item isolation (one bad
//! item does not abort the pass), and supports a `dry_run` mode that reports
//! what it would do without mutating storage.

pub mod cluster_detector;
pub mod decay_analyzer;
pub mod ltm_promoter;
pub mod relationship_discovery;
pub mod scheduler;
pub mod semantic_merge;

use tracing::warn;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::Result;
use crate::storage::Storage;

pub use scheduler::Scheduler;

/// Outcome of applying one agent to one scanned item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// The item was acted on (or would have been, under `dry_run`).
    Applied(String),
    /// The item was scanned but did not meet the agent's action criteria.
    Skipped,
}

/// Summary of one agent's pass over the store.
#[derive(Debug, Clone, Default)]
pub struct AgentSummary {
    pub agent: &'static str,
    pub scanned: usize,
    pub applied: usize,
    pub skipped: usize,
    pub errors: usize,
    pub dry_run: bool,
}

/// Shared contract for a consolidation agent (spec §4.10).
///
/// `scan` finds candidate items; `process_item` decides on and (unless
/// `dry_run`) applies an action for one item. `run` ties the two together
/// with per-item error isolation: a failing item is logged and counted, not
/// propagated, so one malformed record cannot halt the pipeline (spec §4.10
/// "Concurrency & Resource Model": agents run to completion even on partial
/// failure).
pub trait ConsolidationAgent {
    type Item;

    fn name(&self) -> &'static str;

    fn scan(&self, storage: &Storage, clock: &dyn Clock, config: &Config) -> Result<Vec<Self::Item>>;

    fn process_item(
        &self,
        storage: &Storage,
        clock: &dyn Clock,
        config: &Config,
        item: &Self::Item,
        dry_run: bool,
    ) -> Result<ItemOutcome>;

    fn run(&self, storage: &Storage, clock: &dyn Clock, config: &Config, dry_run: bool) -> Result<AgentSummary> {
        let items = self.scan(storage, clock, config)?;
        let mut summary = AgentSummary {
            agent: self.name(),
            scanned: items.len(),
            dry_run,
            ..Default::default()
        };

        for item in &items {
            match self.process_item(storage, clock, config, item, dry_run) {
                Ok(ItemOutcome::Applied(_)) => summary.applied += 1,
                Ok(ItemOutcome::Skipped) => summary.skipped += 1,
                Err(err) => {
                    warn!(agent = self.name(), error = %err, "consolidation item failed, continuing");
                    summary.errors += 1;
                }
            }
        }

        summary.dry_run = dry_run;
        Ok(summary)
    }
}
