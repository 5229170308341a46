//! Consolidation scheduler (spec §4.10): runs the five agents in a fixed
//! order, and exposes a cheap post-save hook that flags newly-saved
//! memories already near the forget threshold.
//!
//! Grounded in the original's `Scheduler.run_pipeline`/`post_save_check`:
//! `AGENT_ORDER` is decay analysis, then clustering-driven merge, then
//! promotion, then relationship discovery — each stage only ever sees
//! memories the previous stage has already settled.

use std::sync::Arc;

use tracing::info;

use crate::clock::Clock;
use crate::config::Config;
use crate::consolidation::cluster_detector::ClusterDetector;
use crate::consolidation::decay_analyzer::DecayAnalyzer;
use crate::consolidation::ltm_promoter::LtmPromoter;
use crate::consolidation::relationship_discovery::RelationshipDiscoveryAgent;
use crate::consolidation::semantic_merge::SemanticMergeAgent;
use crate::consolidation::{AgentSummary, ConsolidationAgent};
use crate::error::Result;
use crate::storage::Storage;
use crate::vault::VaultSink;

/// A memory's score dropped to or below `urgent_threshold` immediately after
/// being saved — raised synchronously from `post_save_check` rather than
/// waiting for the next scheduled pass (spec §4.10 "urgent decay").
#[derive(Debug, Clone)]
pub struct UrgentDecayEvent {
    pub memory_id: String,
    pub score: f64,
}

/// Runs the consolidation pipeline against a [`Storage`] snapshot.
pub struct Scheduler {
    storage: Arc<Storage>,
    clock: Arc<dyn Clock>,
    config: Config,
    vault: Arc<dyn VaultSink>,
}

impl Scheduler {
    pub fn new(storage: Arc<Storage>, clock: Arc<dyn Clock>, config: Config, vault: Arc<dyn VaultSink>) -> Self {
        Self { storage, clock, config, vault }
    }

    /// Run one agent by name, honoring `dry_run`. Returns `None` for an
    /// unrecognized name rather than erroring — callers drive this from a
    /// fixed, known agent list.
    pub fn run_agent(&self, agent_name: &str, dry_run: bool) -> Option<Result<AgentSummary>> {
        let result = match agent_name {
            "decay_analyzer" => DecayAnalyzer.run(&self.storage, self.clock.as_ref(), &self.config, dry_run),
            "cluster_detector" => ClusterDetector.run(&self.storage, self.clock.as_ref(), &self.config, dry_run),
            "semantic_merge" => SemanticMergeAgent.run(&self.storage, self.clock.as_ref(), &self.config, dry_run),
            "ltm_promoter" => LtmPromoter::new(self.vault.clone()).run(&self.storage, self.clock.as_ref(), &self.config, dry_run),
            "relationship_discovery" => RelationshipDiscoveryAgent.run(&self.storage, self.clock.as_ref(), &self.config, dry_run),
            _ => return None,
        };
        Some(result)
    }

    /// Fixed agent execution order (spec §4.10): decay analysis, then
    /// clustering, then cluster-driven merge, then promotion, then
    /// relationship discovery.
    pub const AGENT_ORDER: [&'static str; 5] =
        ["decay_analyzer", "cluster_detector", "semantic_merge", "ltm_promoter", "relationship_discovery"];

    /// Run every agent in [`Self::AGENT_ORDER`]. A failing agent aborts the
    /// rest of the tick immediately rather than being skipped over (spec
    /// §4.9, §9): a later stage would otherwise act on a store an earlier
    /// stage never finished settling.
    pub fn run_pipeline(&self, dry_run: bool) -> Result<Vec<AgentSummary>> {
        let mut summaries = Vec::new();
        for agent_name in Self::AGENT_ORDER {
            match self.run_agent(agent_name, dry_run) {
                Some(Ok(summary)) => {
                    info!(agent = agent_name, applied = summary.applied, scanned = summary.scanned, "consolidation agent completed");
                    summaries.push(summary);
                }
                Some(Err(err)) => {
                    tracing::warn!(agent = agent_name, error = %err, "consolidation agent failed, aborting pipeline tick");
                    return Err(err);
                }
                None => unreachable!("AGENT_ORDER entries must be recognized by run_agent"),
            }
        }
        Ok(summaries)
    }

    /// Check a just-saved memory against `urgent_threshold`, for callers that
    /// want to react immediately rather than waiting for the next scheduled
    /// pipeline run (e.g. surfacing a warning to the saving caller).
    pub fn post_save_check(&self, memory_id: &str) -> Option<UrgentDecayEvent> {
        let memory = self.storage.find_memory(memory_id)?;
        let now = self.clock.now_unix();
        let score = memory.score(now, self.config.decay_model);
        if score <= self.config.thresholds.urgent_threshold {
            Some(UrgentDecayEvent { memory_id: memory_id.to_string(), score })
        } else {
            None
        }
    }
}
