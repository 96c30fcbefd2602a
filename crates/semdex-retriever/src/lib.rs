//! # Semdex Retriever
//!
//! Query-time retrieval and ingestion on top of the chunk store.
//!
//! ## How a query runs
//! ```text
//! "Who is Frodo Baggins?"
//!   ├── EntityExtractor ──> {Frodo, Baggins}
//!   └── Embedder        ──> query vector
//!         ↓
//! similarity_search(limit = 2 × max_results)     distance order
//!         ↓
//! stable sort by entity overlap (only if query has entities)
//!         ↓
//! first max_results
//! ```

pub mod chunker;
pub mod embedder;
pub mod entities;
pub mod indexer;
pub mod retriever;

pub use chunker::ParagraphChunker;
pub use embedder::HashingEmbedder;
pub use entities::CapitalizedEntityExtractor;
pub use indexer::{DocumentIndexer, IngestOutcome, IngestReport, IngestStage, doc_name_from_path};
pub use retriever::{OVERFETCH_FACTOR, Retriever, format_results, rerank_by_entity_overlap};
