//! # Semdex Store
//!
//! Durable chunk storage plus approximate nearest-neighbor search.
//!
//! ## Design
//! - **SQLite** (`rusqlite`) holds the append-only `document_chunks` table
//! - **HNSW** (`hnsw_rs`) over the embedding column, rebuilt from the table
//!   on schema init and appended to after every commit
//! - **Exact fallback** scan when the index is unavailable, and for
//!   document-scoped queries
//! - **Atomic batches**: one transaction per `insert_batch`, rolled back on
//!   any failure
//!
//! ```text
//! StoreHandle::acquire()
//!   └── ChunkStore::open + initialize_schema   (once)
//!         ├── document_chunks (doc_name, chunk_text, named_entities, embedding)
//!         ├── vector_index_meta
//!         └── AnnIndex (HNSW, metric + M + ef_construction)
//! ```

pub mod ann;
pub mod blob;
pub mod distance;
pub mod handle;
pub mod store;

pub use ann::AnnIndex;
pub use handle::StoreHandle;
pub use store::{ChunkStore, IndexStatus, SchemaReport};
