//! Activation service (spec §4.6): the bounded-latency hot path that turns a
//! free-text message into a ranked list of memories to surface.
//!
//! Grounded in the original's `ActivationService.activate`: build candidates
//! from keyword/entity/tag postings, score each by a 0.5/0.3/0.2 blend of
//! keyword relevance, temporal decay, and spreading-activation boost, then
//! optionally walk the relation graph up to three hops to pull in
//! associated memories at a decayed weight.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{instrument, warn};

use crate::activation::index::{build_activation_graph, ActivationGraph};
use crate::clock::Clock;
use crate::decay::{normalize_temporal_factor, DecayModel};
use crate::memory::{
    ActivationContext, ActivationResult, ActivationScore, ActivationSource, FallbackTier,
};
use crate::nlp::KeywordExtractor;
use crate::storage::Storage;

/// Per-hop multiplicative decay applied to spreading-activation scores
/// (spec §4.6: 1-hop 0.5x, 2-hop 0.25x, 3-hop 0.125x).
const SPREAD_DECAY: [f64; 3] = [0.5, 0.25, 0.125];
const MAX_SPREAD_HOPS: usize = 3;

/// Builds and scores activation candidates for one `activate` call.
pub struct ActivationService {
    storage: Arc<Storage>,
    clock: Arc<dyn Clock>,
    extractor: KeywordExtractor,
    decay_model: DecayModel,
}

impl ActivationService {
    pub fn new(storage: Arc<Storage>, clock: Arc<dyn Clock>, decay_model: DecayModel) -> Self {
        Self {
            storage,
            clock,
            extractor: KeywordExtractor::new(),
            decay_model,
        }
    }

    /// Rebuild the activation graph from current storage. Called once per
    /// `activate` invocation; cheap relative to the deadline budget for the
    /// memory counts this engine targets (spec §4.6 Non-goals).
    fn rebuild_index(&self) -> ActivationGraph {
        build_activation_graph(&self.storage, &self.extractor)
    }

    /// Run the full pipeline: candidate search, direct scoring, optional
    /// spreading, ranking, threshold filter, truncation to `max_memories`.
    ///
    /// Never returns `Err`: internal failures degrade to
    /// [`FallbackTier::Error`] with an empty result, since this sits on a
    /// latency-bounded hot path that must not propagate exceptions to the
    /// caller (spec §4.6).
    #[instrument(skip_all, fields(session_id = ?ctx.session_id))]
    pub fn activate(&self, ctx: &ActivationContext) -> ActivationResult {
        let start = std::time::Instant::now();
        let now = self.clock.now_unix();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.activate_inner(ctx, now)
        }));

        match result {
            Ok(r) => r,
            Err(_) => {
                warn!("activation pipeline panicked; returning empty error-tier result");
                ActivationResult::empty(FallbackTier::Error, start.elapsed().as_secs_f64() * 1000.0)
            }
        }
    }

    fn activate_inner(&self, ctx: &ActivationContext, now: i64) -> ActivationResult {
        let start = std::time::Instant::now();

        let keywords: Vec<String> = match &ctx.keywords {
            Some(k) => k.iter().map(|s| s.to_lowercase()).collect(),
            None => self
                .extractor
                .extract_keywords(&ctx.message, 20)
                .into_iter()
                .map(|k| k.to_lowercase())
                .collect(),
        };

        if keywords.is_empty() {
            return ActivationResult::empty(FallbackTier::Full, start.elapsed().as_secs_f64() * 1000.0);
        }

        let graph = self.rebuild_index();
        let mut candidates = graph.find_by_keywords(&keywords);
        candidates.extend(graph.find_by_entities(&keywords));
        candidates.extend(graph.find_by_tags(&keywords));
        let total_candidates = candidates.len();

        let mut scores: HashMap<String, ActivationScore> = HashMap::new();
        let mut direct_matches = Vec::new();

        for memory_id in &candidates {
            if ctx.already_activated.contains(memory_id) {
                continue;
            }
            let Some(memory) = self.storage.find_memory(memory_id) else {
                continue;
            };

            let terms = memory.matchable_terms(&self.extractor);
            let matched: Vec<String> = keywords.iter().filter(|k| terms.contains(*k)).cloned().collect();
            if matched.is_empty() {
                continue;
            }

            let base_relevance = matched.len() as f64 / keywords.len() as f64;
            let temporal_score = normalize_temporal_factor(memory.score(now, self.decay_model));

            let score = ActivationScore::calculate(
                memory_id.clone(),
                base_relevance,
                temporal_score,
                0.0,
                ActivationSource::Direct,
                matched,
            );
            direct_matches.push(memory_id.clone());
            scores.insert(memory_id.clone(), score);
        }

        let mut spread_matches = Vec::new();
        if ctx.enable_spreading {
            spread_matches = self.apply_spreading_activation(&graph, &mut scores, &direct_matches, &ctx.already_activated, now);
        }

        let mut ranked: Vec<&ActivationScore> = scores.values().filter(|s| s.final_score >= ctx.activation_threshold).collect();
        ranked.sort_by(|a, b| b.final_score.partial_cmp(&a.final_score).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(ctx.max_memories);

        let activated_memories: Vec<String> = ranked.iter().map(|s| s.memory_id.clone()).collect();
        let activation_scores: HashMap<String, ActivationScore> = ranked.iter().map(|s| (s.memory_id.clone(), (*s).clone())).collect();

        ActivationResult {
            activated_memories,
            activation_scores,
            direct_matches,
            spread_matches,
            total_candidates,
            activation_latency_ms: start.elapsed().as_secs_f64() * 1000.0,
            fallback_tier: FallbackTier::Full,
        }
    }

    /// Bounded BFS from every directly-matched memory, up to
    /// [`MAX_SPREAD_HOPS`], decaying the parent's own `final_score` by
    /// [`SPREAD_DECAY`] at each hop (no relation-strength multiplier — spec
    /// §4.6 step 5) and tracking a visited set so cycles in the relation
    /// graph cannot loop forever.
    fn apply_spreading_activation(
        &self,
        graph: &ActivationGraph,
        scores: &mut HashMap<String, ActivationScore>,
        seeds: &[String],
        already_activated: &HashSet<String>,
        now: i64,
    ) -> Vec<String> {
        let mut visited: HashSet<String> = seeds.iter().cloned().collect();
        visited.extend(already_activated.iter().cloned());

        let mut spread_matches = Vec::new();
        let mut frontier: Vec<String> = seeds.to_vec();

        for hop in 0..MAX_SPREAD_HOPS {
            let decay = SPREAD_DECAY[hop];
            let mut next_frontier = Vec::new();

            for id in &frontier {
                let parent_final_score = scores.get(id).map(|s| s.final_score).unwrap_or(0.0);

                for (related_id, _edge_strength) in graph.get_related_memories(id) {
                    if visited.contains(related_id) {
                        continue;
                    }
                    visited.insert(related_id.clone());

                    let Some(memory) = self.storage.find_memory(related_id) else {
                        continue;
                    };

                    let spreading_score = (parent_final_score * decay).min(1.0);
                    let temporal_score = normalize_temporal_factor(memory.score(now, self.decay_model));
                    let source = match hop {
                        0 => ActivationSource::Spread1Hop,
                        1 => ActivationSource::Spread2Hop,
                        _ => ActivationSource::Spread3Hop,
                    };

                    let score = ActivationScore::calculate(
                        related_id.clone(),
                        0.0,
                        temporal_score,
                        spreading_score,
                        source,
                        Vec::new(),
                    );

                    spread_matches.push(related_id.clone());
                    next_frontier.push(related_id.clone());
                    scores.entry(related_id.clone()).or_insert(score);
                }
            }

            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }

        spread_matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::memory::{Memory, MemoryMetadata, Relation};

    fn setup() -> (Arc<Storage>, Arc<FixedClock>, ActivationService) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::connect(dir.path()).unwrap());
        let clock = Arc::new(FixedClock::new(1_000));
        let model = DecayModel::default();
        let service = ActivationService::new(storage.clone(), clock.clone(), model);
        (storage, clock, service)
    }

    #[test]
    fn direct_keyword_match_is_activated() {
        let (storage, _clock, service) = setup();
        let mut memory = Memory::new("m1".into(), "User prefers TypeScript for new projects".into(), MemoryMetadata::default(), vec![], 1_000).unwrap();
        memory.touch(1_000, false);
        storage.save_memory(memory).unwrap();

        let ctx = ActivationContext::new("What language should I use for this new project?").with_activation_threshold(0.0);
        let result = service.activate(&ctx);

        assert_eq!(result.fallback_tier, FallbackTier::Full);
        assert!(result.direct_matches.contains(&"m1".to_string()));
    }

    #[test]
    fn spreading_activation_pulls_in_related_memory() {
        let (storage, _clock, service) = setup();
        let mut seed = Memory::new("m1".into(), "User prefers TypeScript".into(), MemoryMetadata::default(), vec![], 1_000).unwrap();
        seed.touch(1_000, false);
        storage.save_memory(seed).unwrap();

        let mut related = Memory::new("m2".into(), "Uses ESLint with strict config".into(), MemoryMetadata::default(), vec![], 1_000).unwrap();
        related.touch(1_000, false);
        storage.save_memory(related).unwrap();

        storage
            .create_relation(Relation {
                id: "r1".into(),
                from_memory_id: "m1".into(),
                to_memory_id: "m2".into(),
                relation_type: "related_to".into(),
                strength: 0.9,
                created_at: 1_000,
                metadata: Default::default(),
            })
            .unwrap();

        let ctx = ActivationContext::new("Tell me about TypeScript preferences").with_activation_threshold(0.0).with_spreading(true);
        let result = service.activate(&ctx);

        assert!(result.spread_matches.contains(&"m2".to_string()));
    }

    #[test]
    fn empty_message_returns_full_tier_empty_result() {
        let (_storage, _clock, service) = setup();
        let ctx = ActivationContext::new("   ");
        let result = service.activate(&ctx);
        assert!(result.activated_memories.is_empty());
        assert_eq!(result.fallback_tier, FallbackTier::Full);
    }

    #[test]
    fn already_activated_memories_are_excluded() {
        let (storage, _clock, service) = setup();
        let mut memory = Memory::new("m1".into(), "User prefers TypeScript".into(), MemoryMetadata::default(), vec![], 1_000).unwrap();
        memory.touch(1_000, false);
        storage.save_memory(memory).unwrap();

        let mut already = HashSet::new();
        already.insert("m1".to_string());
        let ctx = ActivationContext {
            already_activated: already,
            ..ActivationContext::new("TypeScript preferences").with_activation_threshold(0.0)
        };
        let result = service.activate(&ctx);
        assert!(!result.activated_memories.contains(&"m1".to_string()));
    }
}
