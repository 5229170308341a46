//! Injected configuration (spec §6 "Environment")
//!
//! Reading these values from environment variables is the embedding
//! application's job (out of scope here, per [`crate`] docs); this module
//! only defines the shape and the spec's stated defaults.

use crate::decay::{calculate_decay_lambda, DecayModel, Thresholds};
use std::path::PathBuf;

/// Full configuration for an [`crate::api::Stm`] instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding `memories.jsonl` and `relations.jsonl`.
    pub storage_root: PathBuf,
    /// Decay model used by the scoring engine.
    pub decay_model: DecayModel,
    /// Forget/promote/urgent thresholds.
    pub thresholds: Thresholds,
    /// Default activation deadline for the middleware hook.
    pub activation_deadline: std::time::Duration,
    /// Default `max_memories` when a caller omits it.
    pub default_max_memories: usize,
    /// Default `activation_threshold` when a caller omits it.
    pub default_activation_threshold: f64,
    /// Whether embedding generation is enabled (dependency is injected separately).
    pub embeddings_enabled: bool,
    /// Identifier of the configured embedding model, if any.
    pub embedding_model_id: Option<String>,
    /// Path to the external long-term-memory vault, if configured.
    pub vault_path: Option<PathBuf>,
    /// Weight applied to STM results in unified search.
    pub stm_weight: f64,
    /// Weight applied to vault (LTM) results in unified search.
    pub ltm_weight: f64,
    /// Cluster link threshold (cosine/Jaccard similarity).
    pub cluster_link_threshold: f64,
    /// Minimum cluster size.
    pub cluster_min_size: usize,
    /// Maximum cluster size (larger clusters truncated).
    pub cluster_max_size: usize,
    /// Similarity threshold above which a pair counts as a near-duplicate.
    pub duplicate_threshold: f64,
    /// Minimum shared entities for relationship discovery to consider a pair.
    pub min_shared_entities: usize,
    /// Minimum confidence for relationship discovery to create a relation.
    pub min_confidence: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./stm-data"),
            decay_model: DecayModel::default(),
            thresholds: Thresholds::default(),
            activation_deadline: std::time::Duration::from_millis(50),
            default_max_memories: 10,
            default_activation_threshold: 0.5,
            embeddings_enabled: false,
            embedding_model_id: None,
            vault_path: None,
            stm_weight: 1.0,
            ltm_weight: 0.7,
            cluster_link_threshold: 0.83,
            cluster_min_size: 2,
            cluster_max_size: 12,
            duplicate_threshold: 0.88,
            min_shared_entities: 2,
            min_confidence: 0.5,
        }
    }
}

impl Config {
    /// Convenience constructor with a half-life (days) exponential decay
    /// model and otherwise-default thresholds.
    pub fn with_halflife_days(storage_root: PathBuf, halflife_days: f64) -> Self {
        Self {
            storage_root,
            decay_model: DecayModel::Exponential {
                beta: 0.6,
                lambda: calculate_decay_lambda(halflife_days),
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_weights() {
        let cfg = Config::default();
        assert!(cfg.stm_weight > 0.0);
        assert!(cfg.ltm_weight > 0.0);
        assert_eq!(cfg.thresholds.forget_threshold, 0.05);
    }
}
