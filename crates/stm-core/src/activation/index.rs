//! Activation graph: inverted keyword/entity/tag indexes plus relation
//! adjacency (spec §4.5), grounded in the original's `activation_index.py`.
//!
//! Rebuilt wholesale from storage on `build_activation_graph`; the
//! activation service treats it as a read-only snapshot for the duration of
//! one `activate` call.

use std::collections::{HashMap, HashSet};

use crate::memory::Memory;
use crate::nlp::KeywordExtractor;
use crate::storage::Storage;

/// Inverted postings plus an outgoing-relation adjacency list, built once per
/// activation call from the current storage snapshot.
#[derive(Debug, Default)]
pub struct ActivationGraph {
    keyword_postings: HashMap<String, HashSet<String>>,
    entity_postings: HashMap<String, HashSet<String>>,
    tag_postings: HashMap<String, HashSet<String>>,
    /// `from_memory_id -> [(to_memory_id, strength)]`, outgoing edges only
    /// (spec §4.5: no reverse index).
    adjacency: HashMap<String, Vec<(String, f64)>>,
}

impl ActivationGraph {
    /// Candidate memory ids whose postings intersect `keywords` (already
    /// lowercased).
    pub fn find_by_keywords(&self, keywords: &[String]) -> HashSet<String> {
        let mut out = HashSet::new();
        for kw in keywords {
            if let Some(ids) = self.keyword_postings.get(kw) {
                out.extend(ids.iter().cloned());
            }
        }
        out
    }

    /// Candidate memory ids tagged with any of `entities` (already lowercased).
    pub fn find_by_entities(&self, entities: &[String]) -> HashSet<String> {
        let mut out = HashSet::new();
        for e in entities {
            if let Some(ids) = self.entity_postings.get(e) {
                out.extend(ids.iter().cloned());
            }
        }
        out
    }

    /// Candidate memory ids carrying any of `tags` (already lowercased).
    pub fn find_by_tags(&self, tags: &[String]) -> HashSet<String> {
        let mut out = HashSet::new();
        for t in tags {
            if let Some(ids) = self.tag_postings.get(t) {
                out.extend(ids.iter().cloned());
            }
        }
        out
    }

    /// Memories `memory_id` has an outgoing relation to, with edge strength.
    pub fn get_related_memories(&self, memory_id: &str) -> &[(String, f64)] {
        self.adjacency.get(memory_id).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// Rebuild an [`ActivationGraph`] from the current contents of `storage`.
pub fn build_activation_graph(storage: &Storage, extractor: &KeywordExtractor) -> ActivationGraph {
    let mut graph = ActivationGraph::default();

    for memory in storage.list_memories(None, None, 0) {
        index_memory(&mut graph, &memory, extractor);
    }

    for relation in storage.get_all_relations() {
        graph
            .adjacency
            .entry(relation.from_memory_id.clone())
            .or_default()
            .push((relation.to_memory_id.clone(), relation.strength));
    }

    graph
}

fn index_memory(graph: &mut ActivationGraph, memory: &Memory, extractor: &KeywordExtractor) {
    for kw in extractor.extract_keywords(&memory.content, 20) {
        graph
            .keyword_postings
            .entry(kw.to_lowercase())
            .or_default()
            .insert(memory.id.clone());
    }
    for entity in &memory.entities {
        graph
            .entity_postings
            .entry(entity.to_lowercase())
            .or_default()
            .insert(memory.id.clone());
    }
    for tag in &memory.meta.tags {
        graph
            .tag_postings
            .entry(tag.to_lowercase())
            .or_default()
            .insert(memory.id.clone());
    }
}
