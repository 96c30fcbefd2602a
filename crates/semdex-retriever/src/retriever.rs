//! Over-fetch by distance, then stably rerank by entity overlap.

use semdex_core::{ChunkSource, Embedder, EntityExtractor, NamedEntities, Result, SearchResult, SemdexError};
use std::cmp::Reverse;
use std::sync::Arc;

/// Candidates fetched per requested result, leaving room for the rerank.
pub const OVERFETCH_FACTOR: usize = 2;

pub struct Retriever {
    source: Arc<dyn ChunkSource>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn EntityExtractor>,
}

impl Retriever {
    pub fn new(
        source: Arc<dyn ChunkSource>,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn EntityExtractor>,
    ) -> Self {
        Self { source, embedder, extractor }
    }

    /// Up to `max_results` chunks relevant to `query`, best first.
    ///
    /// Collaborator failures are returned as-is.
    pub fn search(&self, query: &str, max_results: usize, doc_scope: Option<&str>) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(SemdexError::Validation("search query must be a non-empty string".into()));
        }
        if max_results == 0 {
            return Err(SemdexError::Validation("max_results must be positive".into()));
        }

        let query_entities = self.extractor.extract(query)?;
        let query_embedding = self
            .embedder
            .encode(&[query])?
            .into_iter()
            .next()
            .ok_or_else(|| SemdexError::Embedding(format!("{} returned no vector for the query", self.embedder.name())))?;

        let limit = max_results.saturating_mul(OVERFETCH_FACTOR);
        let candidates = self.source.similarity_search(&query_embedding, limit, doc_scope)?;
        tracing::debug!(
            "retriever: {} candidates for {} query entities (limit={limit}, doc_scope={doc_scope:?})",
            candidates.len(),
            query_entities.len()
        );

        let mut ranked = if query_entities.is_empty() {
            candidates
        } else {
            rerank_by_entity_overlap(candidates, &query_entities)
        };
        ranked.truncate(max_results);
        Ok(ranked)
    }
}

/// Sort by descending entity overlap. The sort is stable, so candidates with
/// equal overlap keep their distance order.
pub fn rerank_by_entity_overlap(candidates: Vec<SearchResult>, query_entities: &NamedEntities) -> Vec<SearchResult> {
    let mut scored: Vec<(usize, SearchResult)> = candidates
        .into_iter()
        .map(|c| (c.entity_overlap(query_entities), c))
        .collect();
    scored.sort_by_key(|(score, _)| Reverse(*score));
    scored.into_iter().map(|(_, c)| c).collect()
}

/// Plain-text rendering for agents and the CLI.
pub fn format_results(results: &[SearchResult]) -> String {
    let mut out = String::from("\nRetrieved texts:\n");
    for result in results {
        out.push_str(&format!("\n\n===== From {} =====\n", result.doc_name));
        out.push_str(&result.chunk_text);
    }
    out
}
