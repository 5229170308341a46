//! Core API facade (spec §6): the callable operations an RPC/tool-serving
//! layer would dispatch to. The wire format, argument parsing, and transport
//! are out of scope for this crate — `Stm` exposes them as plain functions
//! over owned/borrowed Rust types so that layer has something to call.

use std::sync::Arc;

use tracing::warn;

use crate::activation::ActivationService;
use crate::clock::{new_memory_id, Clock};
use crate::config::Config;
use crate::consolidation::cluster_detector::{detect_clusters, Cluster};
use crate::consolidation::decay_analyzer::{DecayAnalyzer, GarbageCollectionResult};
use crate::consolidation::scheduler::UrgentDecayEvent;
use crate::consolidation::{AgentSummary, Scheduler};
use crate::decay::{normalize_temporal_factor, SECONDS_PER_DAY};
use crate::error::{Result, StmError};
use crate::memory::{
    self, limits, ActivationContext, ActivationResult, Memory, MemoryMetadata, MemoryStatus, Relation,
};
use crate::search::{search_unified, UnifiedSearchResult};
use crate::similarity::text_similarity;
use crate::storage::{Storage, StorageStats};
use crate::vault::{VaultIndex, VaultSink};

/// A newly-saved memory plus any urgent-decay warning raised for it.
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub memory: Memory,
    pub urgent_decay: Option<UrgentDecayEvent>,
}

/// One ranked hit from [`Stm::search_memory`] (spec §6 `search_memory`).
#[derive(Debug, Clone)]
pub struct MemorySearchResult {
    pub id: String,
    pub content: String,
    pub tags: Vec<String>,
    pub score: f64,
    /// Query/content similarity, present only when a `query` was given.
    pub similarity: Option<f64>,
    pub use_count: u64,
    pub last_used: i64,
    pub age_days: f64,
}

/// One page of the full knowledge graph (spec §6 `read_graph`).
#[derive(Debug, Clone)]
pub struct KnowledgeGraphPage {
    pub memories: Vec<Memory>,
    pub relations: Vec<Relation>,
    pub page: usize,
    pub page_size: usize,
    pub total_count: usize,
    pub total_pages: usize,
    pub has_more: bool,
}

/// Bundles storage, activation, and the consolidation scheduler into one
/// facade, mirroring the collaborators a request handler in the (out of
/// scope) RPC layer would hold.
pub struct Stm {
    storage: Arc<Storage>,
    clock: Arc<dyn Clock>,
    activation: ActivationService,
    scheduler: Scheduler,
    vault_index: Arc<dyn VaultIndex>,
    vault_sink: Arc<dyn VaultSink>,
    config: Config,
}

impl Stm {
    pub fn new(
        storage: Arc<Storage>,
        clock: Arc<dyn Clock>,
        scheduler: Scheduler,
        vault_index: Arc<dyn VaultIndex>,
        vault_sink: Arc<dyn VaultSink>,
        config: Config,
    ) -> Self {
        let activation = ActivationService::new(storage.clone(), clock.clone(), config.decay_model);
        Self {
            storage,
            clock,
            activation,
            scheduler,
            vault_index,
            vault_sink,
            config,
        }
    }

    /// Save a new memory (spec §6 `save_memory`), validating size limits and
    /// running an immediate urgent-decay check.
    pub fn save_memory(&self, content: String, meta: MemoryMetadata, entities: Vec<String>) -> Result<SaveOutcome> {
        let now = self.clock.now_unix();
        let memory = Memory::new(new_memory_id(), content, meta, entities, now)?;
        self.storage.save_memory(memory.clone())?;
        let urgent_decay = self.scheduler.post_save_check(&memory.id);
        Ok(SaveOutcome { memory, urgent_decay })
    }

    /// Record a use of `memory_id` (spec §6 `touch_memory`): increments
    /// `use_count`, bumps `last_used`, and nudges `strength` toward its cap.
    pub fn touch_memory(&self, memory_id: &str) -> Result<Memory> {
        let now = self.clock.now_unix();
        self.storage.update_memory(memory_id, |m| m.touch(now, true))
    }

    /// Fetch a single memory by id.
    pub fn get_memory(&self, memory_id: &str) -> Result<Memory> {
        self.storage.get_memory(memory_id)
    }

    /// Physically delete a memory (spec §6 `delete_memory`).
    pub fn delete_memory(&self, memory_id: &str) -> Result<()> {
        self.storage.delete_memory(memory_id)
    }

    /// List memories, optionally filtered by status (spec §6 `open_memories`).
    pub fn list_memories(&self, status: Option<memory::MemoryStatus>) -> Vec<Memory> {
        self.storage.list_memories(status, None, 0)
    }

    /// Run the activation pipeline directly against free text, bypassing the
    /// middleware's latency budget — callers on this path accept the full
    /// activation cost. Distinct from [`Self::search_memory`]'s filtered,
    /// non-spreading lookup (spec §6: `activate` vs `search_memory` are
    /// separate operations).
    pub fn activate(
        &self,
        message: String,
        max_memories: Option<usize>,
        activation_threshold: Option<f64>,
    ) -> ActivationResult {
        let mut ctx = ActivationContext::new(message);
        if let Some(max) = max_memories {
            ctx = ctx.with_max_memories(max);
        } else {
            ctx = ctx.with_max_memories(self.config.default_max_memories);
        }
        ctx = ctx.with_activation_threshold(activation_threshold.unwrap_or(self.config.default_activation_threshold));
        self.activation.activate(&ctx)
    }

    /// Filtered memory lookup (spec §6 `search_memory`): tag/window-filtered
    /// candidates from storage, optionally scored against a free-text `query`,
    /// ranked, and truncated to `top_k`. Unlike [`Self::activate`] this never
    /// walks the relation graph and never excludes already-activated memories.
    pub fn search_memory(
        &self,
        query: Option<String>,
        tags: Option<Vec<String>>,
        top_k: usize,
        window_days: Option<f64>,
        min_score: Option<f64>,
        use_embeddings: bool,
    ) -> Vec<MemorySearchResult> {
        let now = self.clock.now_unix();
        let top_k = top_k.clamp(limits::MIN_TOP_K, limits::MAX_TOP_K);

        if use_embeddings && !self.config.embeddings_enabled {
            warn!("search_memory requested embeddings but none are configured; falling back to text similarity");
        }

        let candidates = self.storage.search_memories(tags.as_deref(), window_days, usize::MAX, now);

        let mut results: Vec<MemorySearchResult> = candidates
            .into_iter()
            .map(|m| {
                let temporal_score = normalize_temporal_factor(m.score(now, self.config.decay_model));
                let similarity = query.as_ref().map(|q| text_similarity(q, &m.content));
                let score = match similarity {
                    Some(sim) => 0.5 * sim + 0.5 * temporal_score,
                    None => temporal_score,
                };
                let age_days = (now - m.created_at).max(0) as f64 / SECONDS_PER_DAY;
                MemorySearchResult {
                    id: m.id,
                    content: m.content,
                    tags: m.meta.tags,
                    score,
                    similarity,
                    use_count: m.use_count,
                    last_used: m.last_used,
                    age_days,
                }
            })
            .filter(|r| min_score.is_none_or(|min| r.score >= min))
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        results
    }

    /// Federated search across local storage and the configured vault (spec
    /// §6 `search_unified`).
    pub fn search_unified(&self, query: &str, limit: usize) -> Result<Vec<UnifiedSearchResult>> {
        search_unified(&self.storage, self.vault_index.as_ref(), &self.config, query, limit)
    }

    /// Create a relation between two existing memories (spec §6
    /// `create_relation`). Rejects self-loops, unknown endpoints, and a
    /// duplicate `(from, to, type)` triple.
    pub fn create_relation(&self, from_memory_id: String, to_memory_id: String, relation_type: String, strength: f64) -> Result<Relation> {
        if from_memory_id == to_memory_id {
            return Err(StmError::invalid_argument("to_memory_id", "a memory cannot relate to itself"));
        }
        self.storage.get_memory(&from_memory_id)?;
        self.storage.get_memory(&to_memory_id)?;

        let relation = Relation {
            id: crate::clock::new_relation_id(),
            from_memory_id,
            to_memory_id,
            relation_type,
            strength: strength.clamp(0.0, 1.0),
            created_at: self.clock.now_unix(),
            metadata: Default::default(),
        };
        self.storage.create_relation(relation.clone())?;
        Ok(relation)
    }

    /// Read one page of the full knowledge graph (spec §6 `read_graph`).
    /// `page` is 1-indexed; memories and relations are paginated
    /// independently against the same `page`/`page_size`, and `total_count`
    /// covers whichever of the two is larger.
    pub fn read_graph(&self, page: usize, page_size: usize) -> KnowledgeGraphPage {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let (mut all_memories, mut all_relations) = self.storage.get_knowledge_graph();
        all_memories.sort_by(|a, b| b.last_used.cmp(&a.last_used).then_with(|| a.id.cmp(&b.id)));
        all_relations.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        let offset = (page - 1) * page_size;

        let memories = all_memories.iter().skip(offset).take(page_size).cloned().collect();
        let relations = all_relations.iter().skip(offset).take(page_size).cloned().collect();

        let total_count = all_memories.len().max(all_relations.len());
        let total_pages = total_count.div_ceil(page_size).max(1);

        KnowledgeGraphPage {
            memories,
            relations,
            page,
            page_size,
            total_count,
            total_pages,
            has_more: page < total_pages,
        }
    }

    /// Run the full consolidation pipeline (spec §6 `consolidate`), or just
    /// report what it would do under `dry_run`. Aborts on the first agent
    /// failure (spec §4.10, §9).
    pub fn consolidate(&self, dry_run: bool) -> Result<Vec<AgentSummary>> {
        self.scheduler.run_pipeline(dry_run)
    }

    /// Run decay-driven garbage collection directly (spec §6 `gc`), without
    /// running the rest of the consolidation pipeline.
    pub fn gc(&self, dry_run: bool) -> Result<GarbageCollectionResult> {
        DecayAnalyzer.collect(&self.storage, self.clock.as_ref(), &self.config, dry_run)
    }

    /// Force-promote a single memory into the configured vault (spec §6
    /// `promote_memory`), bypassing the scheduled eligibility check.
    pub fn promote_memory(&self, memory_id: &str) -> Result<Memory> {
        let memory = self.storage.get_memory(memory_id)?;
        let vault_id = self.vault_sink.write(&memory)?;
        let now = self.clock.now_unix();
        self.storage.update_memory(memory_id, |m| {
            m.status = MemoryStatus::Promoted;
            m.promoted_at = Some(now);
            m.promoted_to = Some(vault_id.clone());
        })
    }

    /// Run clustering directly (spec §6 `cluster_memories`), without running
    /// the rest of the consolidation pipeline or acting on the result.
    pub fn cluster_memories(&self) -> Vec<Cluster> {
        detect_clusters(&self.storage, &self.config)
    }

    /// Compact the underlying storage log (spec §6 `compact`).
    pub fn compact(&self) -> Result<()> {
        self.storage.compact()
    }

    /// Current storage footprint (spec §6 `storage_stats`).
    pub fn storage_stats(&self) -> Result<StorageStats> {
        self.storage.storage_stats()
    }
}
