//! Activation middleware (spec §4.6, §4.7): a deadline-bounded hook an
//! embedding RPC layer calls before dispatching a tool, so recently-relevant
//! memories can be injected into context without blocking the call past a
//! fixed budget.
//!
//! Grounded in the original's `ActivationMiddleware.on_call_tool`: extract a
//! query string from the tool's arguments without mutating them, run
//! activation under a deadline, and degrade tier-by-tier rather than
//! propagating a timeout to the caller.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::activation::ActivationService;
use crate::memory::{ActivationContext, ActivationResult, FallbackTier};

/// Maps a tool name to the argument field holding its free-text query.
#[derive(Debug, Clone, Default)]
pub struct ToolFieldMap {
    fields: HashMap<String, String>,
}

impl ToolFieldMap {
    /// An empty map; every tool falls back to `"message"`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, tool_name: impl Into<String>, field: impl Into<String>) -> Self {
        self.fields.insert(tool_name.into(), field.into());
        self
    }

    fn field_for(&self, tool_name: &str) -> &str {
        self.fields.get(tool_name).map(|s| s.as_str()).unwrap_or("message")
    }
}

/// Wraps an [`ActivationService`] with a latency budget and a tool-argument
/// query extractor.
pub struct ActivationMiddleware {
    service: Arc<ActivationService>,
    fields: ToolFieldMap,
    deadline: std::time::Duration,
}

impl ActivationMiddleware {
    pub fn new(service: Arc<ActivationService>, fields: ToolFieldMap, deadline: std::time::Duration) -> Self {
        Self { service, fields, deadline }
    }

    /// Extract the free-text query for `tool_name` from its call arguments,
    /// without mutating `args`. Returns `None` if the configured field is
    /// absent or not a string, in which case the caller should skip
    /// activation entirely rather than activate on an empty message.
    fn extract_query(&self, tool_name: &str, args: &Value) -> Option<String> {
        let field = self.fields.field_for(tool_name);
        args.get(field)?.as_str().map(|s| s.to_string())
    }

    /// Run activation for an incoming tool call, never blocking the caller
    /// past `self.deadline`. On timeout, falls back to a keyword-only pass
    /// with spreading disabled (cheaper, usually well under budget); if that
    /// also cannot be scheduled in time, returns an empty
    /// [`FallbackTier::Error`] result. Never mutates `args`.
    pub async fn on_call_tool(&self, tool_name: &str, args: &Value) -> Option<ActivationResult> {
        let query = self.extract_query(tool_name, args)?;
        if query.trim().is_empty() {
            return None;
        }

        let ctx = ActivationContext::new(query);
        Some(self.activate_with_deadline(ctx).await)
    }

    async fn activate_with_deadline(&self, ctx: ActivationContext) -> ActivationResult {
        let service = self.service.clone();
        let full_ctx = ctx.clone();
        let full = tokio::time::timeout(
            self.deadline,
            tokio::task::spawn_blocking(move || service.activate(&full_ctx)),
        )
        .await;

        match full {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                warn!(error = %join_err, "activation task panicked");
                ActivationResult::empty(FallbackTier::Error, 0.0)
            }
            Err(_elapsed) => {
                warn!(deadline_ms = self.deadline.as_millis(), "activation deadline exceeded, falling back to keyword-only");
                self.activate_keyword_only(ctx).await
            }
        }
    }

    async fn activate_keyword_only(&self, ctx: ActivationContext) -> ActivationResult {
        let service = self.service.clone();
        let degraded_ctx = ctx.with_spreading(false);
        let remaining = self.deadline;

        let degraded = tokio::time::timeout(
            remaining,
            tokio::task::spawn_blocking(move || service.activate(&degraded_ctx)),
        )
        .await;

        match degraded {
            Ok(Ok(mut result)) => {
                result.fallback_tier = FallbackTier::KeywordOnly;
                result
            }
            _ => ActivationResult::empty(FallbackTier::Error, 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::decay::DecayModel;
    use crate::memory::{Memory, MemoryMetadata};
    use crate::storage::Storage;
    use serde_json::json;

    fn middleware() -> ActivationMiddleware {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::connect(dir.path()).unwrap());
        let mut memory = Memory::new("m1".into(), "User prefers TypeScript".into(), MemoryMetadata::default(), vec![], 1_000).unwrap();
        memory.touch(1_000, false);
        storage.save_memory(memory).unwrap();

        let clock = Arc::new(FixedClock::new(1_000));
        let service = Arc::new(ActivationService::new(storage, clock, DecayModel::default()));
        ActivationMiddleware::new(service, ToolFieldMap::new().with_field("chat", "message"), std::time::Duration::from_millis(50))
    }

    #[tokio::test]
    async fn extracts_query_and_activates() {
        let mw = middleware();
        let args = json!({ "message": "What does the user prefer for languages?" });
        let result = mw.on_call_tool("chat", &args).await;
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn missing_field_yields_none_without_mutating_args() {
        let mw = middleware();
        let args = json!({ "other_field": "irrelevant" });
        let before = args.clone();
        let result = mw.on_call_tool("chat", &args).await;
        assert!(result.is_none());
        assert_eq!(args, before);
    }

    #[tokio::test]
    async fn blank_query_yields_none() {
        let mw = middleware();
        let args = json!({ "message": "   " });
        assert!(mw.on_call_tool("chat", &args).await.is_none());
    }
}
