//! Short-term memory engine for AI assistants.
//!
//! This crate is the core: temporal decay scoring, a bounded-latency
//! activation pipeline with spreading activation over a keyword/entity/tag
//! graph, append-only JSONL storage, and a scheduled consolidation pipeline
//! that clusters, merges, promotes, and links memories over time.
//!
//! Explicitly out of scope (modeled only as the small interfaces this crate
//! consumes): the RPC/tool-serving façade, the markdown vault writer and its
//! full-text index ([`vault::VaultSink`]/[`vault::VaultIndex`] are the seam),
//! the HTTP/web layer, CLI argument parsing, and logging subscriber setup —
//! this crate depends on [`tracing`] only, never a subscriber. Reading
//! configuration from the environment is likewise the embedding
//! application's job; see [`config::Config`] for the shape it is expected to
//! populate.

pub mod activation;
pub mod api;
pub mod clock;
pub mod config;
pub mod consolidation;
pub mod decay;
pub mod error;
pub mod memory;
pub mod middleware;
pub mod nlp;
pub mod search;
pub mod similarity;
pub mod storage;
pub mod vault;

pub use api::Stm;
pub use error::{Result, StmError};

/// Crate version, for embedding in diagnostics or a health-check response.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-exports of the types most callers need, so `use stm_core::prelude::*`
/// covers the common path without enumerating every module.
pub mod prelude {
    pub use crate::activation::{ActivationGraph, ActivationService};
    pub use crate::api::Stm;
    pub use crate::clock::{Clock, FixedClock, SystemClock};
    pub use crate::config::Config;
    pub use crate::decay::DecayModel;
    pub use crate::error::{Result, StmError};
    pub use crate::memory::{ActivationContext, ActivationResult, Memory, MemoryMetadata, MemoryStatus, Relation};
    pub use crate::storage::Storage;
    pub use crate::vault::{NullVaultIndex, NullVaultSink, VaultIndex, VaultSink};
}
