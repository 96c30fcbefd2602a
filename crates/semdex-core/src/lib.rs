//! # Semdex Core
//!
//! Shared building blocks for the Semdex semantic chunk store:
//! configuration, the error taxonomy, the typed `Chunk` / `SearchResult`
//! records, and the traits external collaborators plug in through.
//!
//! ## Data flow
//! ```text
//! Chunker ──> (doc_name, chunk_text)
//!               ├── EntityExtractor ──> named_entities
//!               └── Embedder        ──> embedding[embedding_dim]
//!                     ↓
//!               ChunkStore.insert_batch   (semdex-store)
//!                     ↓
//! query ──> Retriever.search ──> ChunkSource.similarity_search ──> rerank
//! ```

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{DistanceMetric, SemdexConfig, VectorIndexConfig};
pub use error::{BatchStage, Result, SemdexError};
pub use traits::{ChunkSource, Chunker, Embedder, EntityExtractor};
pub use types::{Chunk, NamedEntities, SearchResult};
