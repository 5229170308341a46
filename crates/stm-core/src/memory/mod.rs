//! Data model (spec §3): memories, relations, and the transient types that
//! flow through the activation pipeline.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StmError};

/// Hard validation limits (spec §6 "Validation limits (hard)").
pub mod limits {
    pub const MAX_CONTENT_CHARS: usize = 50_000;
    pub const MAX_TAG_CHARS: usize = 100;
    pub const MAX_TAGS: usize = 50;
    pub const MAX_ENTITIES: usize = 100;
    pub const MAX_SOURCE_CHARS: usize = 500;
    pub const MAX_CONTEXT_CHARS: usize = 1_000;
    pub const MIN_TOP_K: usize = 1;
    pub const MAX_TOP_K: usize = 100;
    pub const MIN_WINDOW_DAYS: u32 = 1;
    pub const MAX_WINDOW_DAYS: u32 = 3_650;
    pub const MAX_CONTEXT_KEYWORDS: usize = 20;
    pub const MIN_MAX_MEMORIES: usize = 1;
    pub const MAX_MAX_MEMORIES: usize = 100;
}

/// Lifecycle status of a [`Memory`] (spec §3 invariants: `active -> promoted`
/// is monotone, `active -> archived` comes only from GC, `active -> deleted`
/// is physical removal rather than a status).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStatus {
    Active,
    Promoted,
    Archived,
}

impl Default for MemoryStatus {
    fn default() -> Self {
        MemoryStatus::Active
    }
}

/// Flexible metadata carried by a [`Memory`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    /// Ordered, short labels (`<= 50` items, each `<= 100` chars).
    #[serde(default)]
    pub tags: Vec<String>,
    /// Where this memory came from.
    #[serde(default)]
    pub source: Option<String>,
    /// Free-text context at creation time.
    #[serde(default)]
    pub context: Option<String>,
    /// Caller-defined additional fields.
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A memory record (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub meta: MemoryMetadata,
    pub created_at: i64,
    pub last_used: i64,
    #[serde(default)]
    pub use_count: u64,
    #[serde(default = "default_strength")]
    pub strength: f64,
    #[serde(default)]
    pub status: MemoryStatus,
    #[serde(default)]
    pub promoted_at: Option<i64>,
    #[serde(default)]
    pub promoted_to: Option<String>,
    #[serde(default)]
    pub embed: Option<Vec<f64>>,
    #[serde(default)]
    pub entities: Vec<String>,
}

fn default_strength() -> f64 {
    1.0
}

/// Soft cap applied to `strength` by [`Memory::touch`].
pub const STRENGTH_SOFT_CAP: f64 = 2.0;

impl Memory {
    /// Construct a new active memory, validating size limits (spec §6).
    pub fn new(
        id: String,
        content: String,
        meta: MemoryMetadata,
        entities: Vec<String>,
        now: i64,
    ) -> Result<Self> {
        validate_content(&content)?;
        validate_meta(&meta)?;
        validate_entities(&entities)?;

        Ok(Self {
            id,
            content,
            meta,
            created_at: now,
            last_used: now,
            use_count: 0,
            strength: default_strength(),
            status: MemoryStatus::Active,
            promoted_at: None,
            promoted_to: None,
            embed: None,
            entities,
        })
    }

    /// Apply a `touch`: increment use count, bump `last_used`, optionally
    /// nudge `strength` toward the soft cap (spec §6 `touch_memory`).
    pub fn touch(&mut self, now: i64, boost_strength: bool) {
        self.use_count += 1;
        self.last_used = now;
        if boost_strength {
            self.strength = (self.strength + 0.1).min(STRENGTH_SOFT_CAP);
        }
    }

    /// Current decay score under `model`.
    pub fn score(&self, now: i64, model: crate::decay::DecayModel) -> f64 {
        crate::decay::calculate_score(self.use_count, self.last_used, self.strength, now, model)
    }

    /// Lowercased union of tags, entities, and content keywords — the
    /// "matchable terms" the activation service scores query keywords
    /// against (spec §4.6 step 4).
    pub fn matchable_terms(&self, extractor: &crate::nlp::KeywordExtractor) -> HashSet<String> {
        let mut terms: HashSet<String> = HashSet::new();
        terms.extend(self.meta.tags.iter().map(|t| t.to_lowercase()));
        terms.extend(self.entities.iter().map(|e| e.to_lowercase()));
        terms.extend(
            extractor
                .extract_keywords(&self.content, 20)
                .into_iter()
                .map(|k| k.to_lowercase()),
        );
        terms
    }
}

/// Validate memory content against the hard size limit.
pub fn validate_content(content: &str) -> Result<()> {
    if content.chars().count() > limits::MAX_CONTENT_CHARS {
        return Err(StmError::invalid_argument(
            "content",
            format!("exceeds {} characters", limits::MAX_CONTENT_CHARS),
        ));
    }
    Ok(())
}

/// Validate metadata (tag count/length, source/context length).
pub fn validate_meta(meta: &MemoryMetadata) -> Result<()> {
    if meta.tags.len() > limits::MAX_TAGS {
        return Err(StmError::invalid_argument(
            "tags",
            format!("exceeds {} tags", limits::MAX_TAGS),
        ));
    }
    for tag in &meta.tags {
        if tag.chars().count() > limits::MAX_TAG_CHARS {
            return Err(StmError::invalid_argument(
                "tags",
                format!("tag `{tag}` exceeds {} characters", limits::MAX_TAG_CHARS),
            ));
        }
    }
    if let Some(source) = &meta.source {
        if source.chars().count() > limits::MAX_SOURCE_CHARS {
            return Err(StmError::invalid_argument(
                "source",
                format!("exceeds {} characters", limits::MAX_SOURCE_CHARS),
            ));
        }
    }
    if let Some(context) = &meta.context {
        if context.chars().count() > limits::MAX_CONTEXT_CHARS {
            return Err(StmError::invalid_argument(
                "context",
                format!("exceeds {} characters", limits::MAX_CONTEXT_CHARS),
            ));
        }
    }
    Ok(())
}

/// Validate entity count.
pub fn validate_entities(entities: &[String]) -> Result<()> {
    if entities.len() > limits::MAX_ENTITIES {
        return Err(StmError::invalid_argument(
            "entities",
            format!("exceeds {} entities", limits::MAX_ENTITIES),
        ));
    }
    Ok(())
}

/// A relation between two memories (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: String,
    pub from_memory_id: String,
    pub to_memory_id: String,
    pub relation_type: String,
    pub strength: f64,
    pub created_at: i64,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Where an [`ActivationScore`] came from (spec §3, BFS depth tags).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationSource {
    Direct,
    Spread1Hop,
    Spread2Hop,
    Spread3Hop,
}

/// Transient, per-turn input to the activation service (spec §3).
#[derive(Debug, Clone)]
pub struct ActivationContext {
    pub message: String,
    pub keywords: Option<Vec<String>>,
    pub session_id: Option<String>,
    pub already_activated: HashSet<String>,
    pub max_memories: usize,
    pub activation_threshold: f64,
    pub enable_spreading: bool,
}

impl ActivationContext {
    /// Construct a context, clamping `max_memories`/`activation_threshold`
    /// into their spec-mandated ranges rather than rejecting out-of-range
    /// values (the middleware always supplies these; no caller-facing
    /// validation error is meaningful on a hot path input).
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            keywords: None,
            session_id: None,
            already_activated: HashSet::new(),
            max_memories: 10,
            activation_threshold: 0.5,
            enable_spreading: true,
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = Some(keywords.into_iter().take(limits::MAX_CONTEXT_KEYWORDS).collect());
        self
    }

    pub fn with_max_memories(mut self, max_memories: usize) -> Self {
        self.max_memories = max_memories.clamp(limits::MIN_MAX_MEMORIES, limits::MAX_MAX_MEMORIES);
        self
    }

    pub fn with_activation_threshold(mut self, threshold: f64) -> Self {
        self.activation_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_spreading(mut self, enabled: bool) -> Self {
        self.enable_spreading = enabled;
        self
    }
}

/// Immutable once calculated (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationScore {
    pub memory_id: String,
    pub base_relevance: f64,
    pub temporal_score: f64,
    pub spreading_score: f64,
    pub final_score: f64,
    pub source: ActivationSource,
    pub matched_keywords: Vec<String>,
}

impl ActivationScore {
    /// Compute the weighted final score (spec §4.6 step 4):
    /// `0.5*base + 0.3*temporal + 0.2*spreading`, capped at `1.0`.
    pub fn calculate(
        memory_id: String,
        base_relevance: f64,
        temporal_score: f64,
        spreading_score: f64,
        source: ActivationSource,
        matched_keywords: Vec<String>,
    ) -> Self {
        let final_score = (0.5 * base_relevance + 0.3 * temporal_score + 0.2 * spreading_score).min(1.0);
        Self {
            memory_id,
            base_relevance,
            temporal_score,
            spreading_score,
            final_score,
            source,
            matched_keywords,
        }
    }
}

/// The reduced mode the activation service returned (spec §3, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackTier {
    Full,
    KeywordOnly,
    Error,
}

/// Immutable result of one activation call (spec §3).
#[derive(Debug, Clone)]
pub struct ActivationResult {
    pub activated_memories: Vec<String>,
    pub activation_scores: HashMap<String, ActivationScore>,
    pub direct_matches: Vec<String>,
    pub spread_matches: Vec<String>,
    pub total_candidates: usize,
    pub activation_latency_ms: f64,
    pub fallback_tier: FallbackTier,
}

impl ActivationResult {
    /// An empty result, used by the `error` fallback tier (spec §4.6).
    pub fn empty(tier: FallbackTier, latency_ms: f64) -> Self {
        Self {
            activated_memories: Vec::new(),
            activation_scores: HashMap::new(),
            direct_matches: Vec::new(),
            spread_matches: Vec::new(),
            total_candidates: 0,
            activation_latency_ms: latency_ms,
            fallback_tier: tier,
        }
    }
}
