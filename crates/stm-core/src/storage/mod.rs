//! Append-only JSONL storage (spec §4.4)
//!
//! Two append-only files — `memories.jsonl` and `relations.jsonl` — each
//! record a full snapshot on every write (create/update/delete-as-tombstone).
//! An in-memory `HashMap` index is rebuilt from the file on `open` and kept
//! in sync on every write, so reads never touch disk. Generalized from a
//! SQLite-backed connection object to two file handles plus indexes; the
//! surrounding `StmError`/`Result<T>` and `Mutex`-guarded-state shape is
//! unchanged from the rest of the crate.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{Result, StmError};
use crate::memory::{Memory, MemoryStatus, Relation};

/// One line of `memories.jsonl`: either a live snapshot or a tombstone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum MemoryRecord {
    Put(Memory),
    Delete { id: String },
}

/// One line of `relations.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum RelationRecord {
    Put(Relation),
    Delete { id: String },
}

/// Aggregate counters returned by [`Storage::storage_stats`].
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StorageStats {
    pub memory_count: usize,
    pub relation_count: usize,
    pub memories_file_bytes: u64,
    pub relations_file_bytes: u64,
    pub tombstone_ratio: f64,
}

struct Inner {
    memories: HashMap<String, Memory>,
    relations: HashMap<String, Relation>,
    memories_file: File,
    relations_file: File,
    /// Count of append lines written since the index was last rebuilt,
    /// including tombstones — used to decide when `compact` is worthwhile.
    memories_lines_written: u64,
    relations_lines_written: u64,
}

/// Append-only JSONL-backed storage for memories and relations.
///
/// Holds an exclusive lock over an in-process [`Mutex`]; concurrent access
/// from multiple processes against the same directory is not supported
/// (spec §5: single-writer-per-process).
pub struct Storage {
    root: PathBuf,
    inner: Mutex<Inner>,
}

fn memories_path(root: &Path) -> PathBuf {
    root.join("memories.jsonl")
}

fn relations_path(root: &Path) -> PathBuf {
    root.join("relations.jsonl")
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new().create(true).append(true).open(path).map_err(StmError::from)
}

fn load_memories(path: &Path) -> Result<(HashMap<String, Memory>, u64)> {
    let mut map = HashMap::new();
    let mut lines = 0u64;
    if !path.exists() {
        return Ok((map, lines));
    }
    let file = File::open(path)?;
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        lines += 1;
        match serde_json::from_str::<MemoryRecord>(&line) {
            Ok(MemoryRecord::Put(m)) => {
                map.insert(m.id.clone(), m);
            }
            Ok(MemoryRecord::Delete { id }) => {
                map.remove(&id);
            }
            Err(err) => {
                warn!(error = %err, "skipping malformed memories.jsonl line");
            }
        }
    }
    Ok((map, lines))
}

fn load_relations(path: &Path) -> Result<(HashMap<String, Relation>, u64)> {
    let mut map = HashMap::new();
    let mut lines = 0u64;
    if !path.exists() {
        return Ok((map, lines));
    }
    let file = File::open(path)?;
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        lines += 1;
        match serde_json::from_str::<RelationRecord>(&line) {
            Ok(RelationRecord::Put(r)) => {
                map.insert(r.id.clone(), r);
            }
            Ok(RelationRecord::Delete { id }) => {
                map.remove(&id);
            }
            Err(err) => {
                warn!(error = %err, "skipping malformed relations.jsonl line");
            }
        }
    }
    Ok((map, lines))
}

impl Storage {
    /// Open (creating if absent) the storage directory at `root`, loading
    /// both files into memory.
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub fn connect(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;

        let (memories, memories_lines) = load_memories(&memories_path(&root))?;
        let (relations, relations_lines) = load_relations(&relations_path(&root))?;

        let memories_file = open_append(&memories_path(&root))?;
        let relations_file = open_append(&relations_path(&root))?;

        debug!(memories = memories.len(), relations = relations.len(), "storage opened");

        Ok(Self {
            root,
            inner: Mutex::new(Inner {
                memories,
                relations,
                memories_file,
                relations_file,
                memories_lines_written: memories_lines,
                relations_lines_written: relations_lines,
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn append_memory_record(inner: &mut Inner, record: &MemoryRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        inner.memories_file.write_all(line.as_bytes())?;
        inner.memories_file.flush()?;
        inner.memories_lines_written += 1;
        Ok(())
    }

    fn append_relation_record(inner: &mut Inner, record: &RelationRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        inner.relations_file.write_all(line.as_bytes())?;
        inner.relations_file.flush()?;
        inner.relations_lines_written += 1;
        Ok(())
    }

    /// Insert or overwrite a memory by id.
    pub fn save_memory(&self, memory: Memory) -> Result<()> {
        let mut inner = self.lock();
        Self::append_memory_record(&mut inner, &MemoryRecord::Put(memory.clone()))?;
        inner.memories.insert(memory.id.clone(), memory);
        Ok(())
    }

    /// Fetch a memory by id.
    pub fn get_memory(&self, id: &str) -> Result<Memory> {
        self.lock()
            .memories
            .get(id)
            .cloned()
            .ok_or_else(|| StmError::NotFound(id.to_string()))
    }

    /// Look up a memory without erroring if absent.
    pub fn find_memory(&self, id: &str) -> Option<Memory> {
        self.lock().memories.get(id).cloned()
    }

    /// Replace a memory in place via `updater`, persisting the new snapshot.
    pub fn update_memory(&self, id: &str, updater: impl FnOnce(&mut Memory)) -> Result<Memory> {
        let mut inner = self.lock();
        let mut memory = inner
            .memories
            .get(id)
            .cloned()
            .ok_or_else(|| StmError::NotFound(id.to_string()))?;
        updater(&mut memory);
        Self::append_memory_record(&mut inner, &MemoryRecord::Put(memory.clone()))?;
        inner.memories.insert(id.to_string(), memory.clone());
        Ok(memory)
    }

    /// Physically remove a memory, appending a tombstone record.
    pub fn delete_memory(&self, id: &str) -> Result<()> {
        let mut inner = self.lock();
        if !inner.memories.contains_key(id) {
            return Err(StmError::NotFound(id.to_string()));
        }
        Self::append_memory_record(&mut inner, &MemoryRecord::Delete { id: id.to_string() })?;
        inner.memories.remove(id);
        Ok(())
    }

    /// Memories optionally filtered by status, sorted most-recently-used
    /// first, with `offset`/`limit` pagination (spec §4.4).
    pub fn list_memories(&self, status: Option<MemoryStatus>, limit: Option<usize>, offset: usize) -> Vec<Memory> {
        let mut memories: Vec<Memory> = self
            .lock()
            .memories
            .values()
            .filter(|m| status.is_none_or(|s| m.status == s))
            .cloned()
            .collect();
        memories.sort_by(|a, b| b.last_used.cmp(&a.last_used));

        if offset >= memories.len() {
            return Vec::new();
        }
        memories.drain(0..offset);
        if let Some(limit) = limit {
            memories.truncate(limit);
        }
        memories
    }

    /// Active memories matching any of `tags` (if given) and last used within
    /// `window_days` of `now` (if given), sorted most-recently-used first and
    /// truncated to `limit` (spec §4.4 `search_memories`).
    pub fn search_memories(&self, tags: Option<&[String]>, window_days: Option<f64>, limit: usize, now: i64) -> Vec<Memory> {
        let tag_filter: Option<HashSet<String>> = tags.map(|t| t.iter().map(|s| s.to_lowercase()).collect());
        let window_secs = window_days.map(|days| (days * crate::decay::SECONDS_PER_DAY) as i64);

        let mut results: Vec<Memory> = self
            .lock()
            .memories
            .values()
            .filter(|m| m.status == MemoryStatus::Active)
            .filter(|m| {
                tag_filter
                    .as_ref()
                    .is_none_or(|wanted| m.meta.tags.iter().any(|t| wanted.contains(&t.to_lowercase())))
            })
            .filter(|m| window_secs.is_none_or(|w| now - m.last_used <= w))
            .cloned()
            .collect();

        results.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        results.truncate(limit);
        results
    }

    /// Count of live (non-deleted) memories, optionally filtered by status.
    pub fn count_memories(&self, status: Option<MemoryStatus>) -> usize {
        self.lock()
            .memories
            .values()
            .filter(|m| status.is_none_or(|s| m.status == s))
            .count()
    }

    /// All `(id, embedding)` pairs for memories that carry one, for clustering.
    pub fn get_all_embeddings(&self) -> Vec<(String, Vec<f64>)> {
        self.lock()
            .memories
            .values()
            .filter_map(|m| m.embed.as_ref().map(|e| (m.id.clone(), e.clone())))
            .collect()
    }

    /// Insert a relation by id, rejecting a duplicate `(from, to, type)`
    /// triple rather than silently appending a second edge (spec §3/§8).
    pub fn create_relation(&self, relation: Relation) -> Result<()> {
        let mut inner = self.lock();
        if let Some(existing) = inner.relations.values().find(|r| {
            r.from_memory_id == relation.from_memory_id
                && r.to_memory_id == relation.to_memory_id
                && r.relation_type == relation.relation_type
        }) {
            return Err(StmError::conflict(
                format!(
                    "relation `{}` from `{}` to `{}` already exists",
                    relation.relation_type, relation.from_memory_id, relation.to_memory_id
                ),
                existing.id.clone(),
            ));
        }
        Self::append_relation_record(&mut inner, &RelationRecord::Put(relation.clone()))?;
        inner.relations.insert(relation.id.clone(), relation);
        Ok(())
    }

    /// All relations touching `memory_id`, in either direction.
    pub fn get_relations(&self, memory_id: &str) -> Vec<Relation> {
        self.lock()
            .relations
            .values()
            .filter(|r| r.from_memory_id == memory_id || r.to_memory_id == memory_id)
            .cloned()
            .collect()
    }

    /// Every relation in storage.
    pub fn get_all_relations(&self) -> Vec<Relation> {
        self.lock().relations.values().cloned().collect()
    }

    /// Physically remove a relation, appending a tombstone record.
    pub fn delete_relation(&self, id: &str) -> Result<()> {
        let mut inner = self.lock();
        if !inner.relations.contains_key(id) {
            return Err(StmError::NotFound(id.to_string()));
        }
        Self::append_relation_record(&mut inner, &RelationRecord::Delete { id: id.to_string() })?;
        inner.relations.remove(id);
        Ok(())
    }

    /// All memories and relations, for a full knowledge-graph read.
    pub fn get_knowledge_graph(&self) -> (Vec<Memory>, Vec<Relation>) {
        let inner = self.lock();
        (
            inner.memories.values().cloned().collect(),
            inner.relations.values().cloned().collect(),
        )
    }

    /// Rewrite both files keeping only live-record `Put` lines, dropping
    /// tombstones and superseded snapshots, then atomically replace the
    /// originals. Safe to call concurrently with reads (the lock is held for
    /// the whole operation); not safe to call from two processes at once.
    #[instrument(skip_all)]
    pub fn compact(&self) -> Result<()> {
        let mut inner = self.lock();

        let memories_tmp = self.root.join("memories.jsonl.compact");
        let relations_tmp = self.root.join("relations.jsonl.compact");

        {
            let mut tmp = File::create(&memories_tmp)?;
            for memory in inner.memories.values() {
                let mut line = serde_json::to_string(&MemoryRecord::Put(memory.clone()))?;
                line.push('\n');
                tmp.write_all(line.as_bytes())?;
            }
            tmp.flush()?;
        }
        {
            let mut tmp = File::create(&relations_tmp)?;
            for relation in inner.relations.values() {
                let mut line = serde_json::to_string(&RelationRecord::Put(relation.clone()))?;
                line.push('\n');
                tmp.write_all(line.as_bytes())?;
            }
            tmp.flush()?;
        }

        std::fs::rename(&memories_tmp, memories_path(&self.root))?;
        std::fs::rename(&relations_tmp, relations_path(&self.root))?;

        inner.memories_file = open_append(&memories_path(&self.root))?;
        inner.relations_file = open_append(&relations_path(&self.root))?;
        inner.memories_lines_written = inner.memories.len() as u64;
        inner.relations_lines_written = inner.relations.len() as u64;

        debug!(
            memories = inner.memories.len(),
            relations = inner.relations.len(),
            "compaction complete"
        );
        Ok(())
    }

    /// Whether a compaction is likely to recover meaningful space: the number
    /// of append lines written exceeds the number of live records by more
    /// than a fixed slack, mirroring a simple tombstone-ratio heuristic.
    pub fn should_compact(&self) -> bool {
        let inner = self.lock();
        let total_lines = inner.memories_lines_written + inner.relations_lines_written;
        let live = (inner.memories.len() + inner.relations.len()) as u64;
        total_lines > live.saturating_mul(2) + 100
    }

    /// Aggregate counters describing current storage footprint.
    pub fn storage_stats(&self) -> Result<StorageStats> {
        let inner = self.lock();
        let memories_bytes = std::fs::metadata(memories_path(&self.root)).map(|m| m.len()).unwrap_or(0);
        let relations_bytes = std::fs::metadata(relations_path(&self.root)).map(|m| m.len()).unwrap_or(0);

        let total_lines = inner.memories_lines_written + inner.relations_lines_written;
        let live = (inner.memories.len() + inner.relations.len()) as u64;
        let tombstone_ratio = if total_lines == 0 {
            0.0
        } else {
            1.0 - (live as f64 / total_lines as f64)
        };

        Ok(StorageStats {
            memory_count: inner.memories.len(),
            relation_count: inner.relations.len(),
            memories_file_bytes: memories_bytes,
            relations_file_bytes: relations_bytes,
            tombstone_ratio: tombstone_ratio.max(0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryMetadata;

    fn sample_memory(id: &str, now: i64) -> Memory {
        Memory::new(id.to_string(), "hello world".into(), MemoryMetadata::default(), vec![], now).unwrap()
    }

    #[test]
    fn save_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::connect(dir.path()).unwrap();
        storage.save_memory(sample_memory("m1", 1_000)).unwrap();
        let loaded = storage.get_memory("m1").unwrap();
        assert_eq!(loaded.content, "hello world");
    }

    #[test]
    fn delete_then_get_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::connect(dir.path()).unwrap();
        storage.save_memory(sample_memory("m1", 1_000)).unwrap();
        storage.delete_memory("m1").unwrap();
        assert!(matches!(storage.get_memory("m1"), Err(StmError::NotFound(_))));
    }

    #[test]
    fn reopen_replays_log_and_tombstones() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = Storage::connect(dir.path()).unwrap();
            storage.save_memory(sample_memory("m1", 1_000)).unwrap();
            storage.save_memory(sample_memory("m2", 1_000)).unwrap();
            storage.delete_memory("m1").unwrap();
        }
        let reopened = Storage::connect(dir.path()).unwrap();
        assert!(reopened.find_memory("m1").is_none());
        assert!(reopened.find_memory("m2").is_some());
    }

    #[test]
    fn update_memory_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = Storage::connect(dir.path()).unwrap();
            storage.save_memory(sample_memory("m1", 1_000)).unwrap();
            storage.update_memory("m1", |m| m.touch(2_000, true)).unwrap();
        }
        let reopened = Storage::connect(dir.path()).unwrap();
        let m = reopened.get_memory("m1").unwrap();
        assert_eq!(m.use_count, 1);
        assert_eq!(m.last_used, 2_000);
    }

    #[test]
    fn compact_drops_tombstones_and_preserves_live_data() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::connect(dir.path()).unwrap();
        storage.save_memory(sample_memory("m1", 1_000)).unwrap();
        storage.save_memory(sample_memory("m2", 1_000)).unwrap();
        storage.delete_memory("m1").unwrap();
        storage.compact().unwrap();

        let stats_before_reopen = storage.storage_stats().unwrap();
        assert_eq!(stats_before_reopen.memory_count, 1);

        let reopened = Storage::connect(dir.path()).unwrap();
        assert!(reopened.find_memory("m1").is_none());
        assert!(reopened.find_memory("m2").is_some());
    }

    #[test]
    fn relation_crud_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::connect(dir.path()).unwrap();
        storage.save_memory(sample_memory("m1", 1_000)).unwrap();
        storage.save_memory(sample_memory("m2", 1_000)).unwrap();

        let relation = Relation {
            id: "r1".into(),
            from_memory_id: "m1".into(),
            to_memory_id: "m2".into(),
            relation_type: "related_to".into(),
            strength: 0.9,
            created_at: 1_000,
            metadata: Default::default(),
        };
        storage.create_relation(relation).unwrap();

        assert_eq!(storage.get_relations("m1").len(), 1);
        assert_eq!(storage.get_relations("m2").len(), 1);
        assert_eq!(storage.get_all_relations().len(), 1);

        storage.delete_relation("r1").unwrap();
        assert!(storage.get_relations("m1").is_empty());
    }

    #[test]
    fn search_memories_filters_by_tag_and_window() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::connect(dir.path()).unwrap();
        let mut tagged = MemoryMetadata::default();
        tagged.tags = vec!["typescript".into()];
        storage
            .save_memory(Memory::new("m1".into(), "User prefers TypeScript".into(), tagged, vec![], 1_000).unwrap())
            .unwrap();
        storage
            .save_memory(Memory::new("m2".into(), "Unrelated note".into(), MemoryMetadata::default(), vec![], 1_000).unwrap())
            .unwrap();

        let results = storage.search_memories(Some(&["typescript".to_string()]), None, 10, 1_000);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "m1");
    }

    #[test]
    fn search_memories_excludes_outside_window() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::connect(dir.path()).unwrap();
        storage
            .save_memory(Memory::new("m1".into(), "content".into(), MemoryMetadata::default(), vec![], 0).unwrap())
            .unwrap();

        let now = 100 * 86_400;
        let results = storage.search_memories(None, Some(1.0), 10, now);
        assert!(results.is_empty());
    }

    #[test]
    fn create_relation_rejects_duplicate_triple() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::connect(dir.path()).unwrap();
        storage.save_memory(sample_memory("m1", 1_000)).unwrap();
        storage.save_memory(sample_memory("m2", 1_000)).unwrap();

        let relation = Relation {
            id: "r1".into(),
            from_memory_id: "m1".into(),
            to_memory_id: "m2".into(),
            relation_type: "related_to".into(),
            strength: 0.5,
            created_at: 1_000,
            metadata: Default::default(),
        };
        storage.create_relation(relation.clone()).unwrap();

        let duplicate = Relation { id: "r2".into(), ..relation };
        let err = storage.create_relation(duplicate).unwrap_err();
        assert!(matches!(err, StmError::Conflict { .. }));
    }

    #[test]
    fn list_memories_sorts_by_last_used_descending_and_paginates() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::connect(dir.path()).unwrap();
        storage.save_memory(sample_memory("old", 1_000)).unwrap();
        storage.save_memory(sample_memory("new", 2_000)).unwrap();

        let all = storage.list_memories(None, None, 0);
        assert_eq!(all.first().map(|m| m.id.as_str()), Some("new"));

        let page = storage.list_memories(None, Some(1), 1);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "old");
    }
}
