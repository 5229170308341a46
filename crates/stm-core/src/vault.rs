//! External long-term-memory collaborator boundary (spec §1 Non-goals: the
//! markdown vault writer and its full-text index live outside this crate).
//!
//! The consolidation promoter and unified search need somewhere to write
//! promoted memories and something to query alongside local storage; these
//! traits are the seam, with null implementations standing in when no vault
//! is configured.

use crate::error::Result;
use crate::memory::Memory;

/// A write target for promoted memories (spec §4.10 `ltm_promoter`).
pub trait VaultSink: Send + Sync {
    /// Persist `memory` into the vault, returning an opaque vault-side id
    /// (e.g. a note path or document id) used as `Memory::promoted_to`.
    fn write(&self, memory: &Memory) -> Result<String>;
}

/// A search target queried alongside local storage (spec §4.9 unified search).
pub trait VaultIndex: Send + Sync {
    /// Full-text search over the vault, returning `(content, score)` pairs
    /// already sorted by relevance.
    fn search(&self, query: &str, limit: usize) -> Result<Vec<(String, f64)>>;
}

/// No-op [`VaultSink`] used when no vault is configured; `promote_memory`
/// surfaces this as [`crate::error::StmError::Dependency`] rather than
/// silently discarding the promotion.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullVaultSink;

impl VaultSink for NullVaultSink {
    fn write(&self, _memory: &Memory) -> Result<String> {
        Err(crate::error::StmError::Dependency("no vault configured".into()))
    }
}

/// No-op [`VaultIndex`] used when no vault is configured; unified search
/// degrades to local-only results.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullVaultIndex;

impl VaultIndex for NullVaultIndex {
    fn search(&self, _query: &str, _limit: usize) -> Result<Vec<(String, f64)>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_reports_dependency_error() {
        let sink = NullVaultSink;
        let memory = Memory::new("m1".into(), "hi".into(), Default::default(), vec![], 0).unwrap();
        assert!(matches!(sink.write(&memory), Err(crate::error::StmError::Dependency(_))));
    }

    #[test]
    fn null_index_returns_empty() {
        let index = NullVaultIndex;
        assert!(index.search("anything", 10).unwrap().is_empty());
    }
}
