//! Seams for the external collaborators and for the search backend.

use crate::error::Result;
use crate::types::{NamedEntities, SearchResult};

/// Maps texts to fixed-length vectors, one per input, order preserved.
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;
    fn dimension(&self) -> usize;
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
}

/// Maps text to entity surface form → entity type.
pub trait EntityExtractor: Send + Sync {
    fn name(&self) -> &str;
    fn extract(&self, text: &str) -> Result<NamedEntities>;
}

/// Splits one document into text fragments, lazily.
pub trait Chunker: Send + Sync {
    fn name(&self) -> &str;
    fn chunk<'a>(&'a self, text: &'a str) -> Box<dyn Iterator<Item = Result<String>> + 'a>;
}

/// Anything that answers ordered nearest-neighbor queries over stored chunks.
pub trait ChunkSource: Send + Sync {
    fn embedding_dim(&self) -> usize;

    fn similarity_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        doc_scope: Option<&str>,
    ) -> Result<Vec<SearchResult>>;
}
