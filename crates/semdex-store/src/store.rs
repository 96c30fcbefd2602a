//! SQLite chunk table plus HNSW index.

use rusqlite::{Connection, OptionalExtension, params};
use semdex_core::config::StorageConfig;
use semdex_core::{
    BatchStage, Chunk, ChunkSource, NamedEntities, Result, SearchResult, SemdexError,
    VectorIndexConfig,
};
use std::sync::{Mutex, MutexGuard};

use crate::ann::AnnIndex;
use crate::blob::{decode_embedding, encode_embedding};
use crate::distance::distance;

const INSERT_SQL: &str =
    "INSERT INTO document_chunks (doc_name, chunk_text, named_entities, embedding) VALUES (?1, ?2, ?3, ?4)";

/// State of the ANN index. `Unavailable` is a degraded but correct store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexStatus {
    NotBuilt,
    Ready { points: usize },
    Unavailable { reason: String },
}

impl IndexStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// Outcome of `initialize_schema`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReport {
    pub rows: usize,
    pub index: IndexStatus,
}

enum IndexState {
    NotBuilt,
    Ready(AnnIndex),
    Unavailable(String),
}

impl IndexState {
    fn status(&self) -> IndexStatus {
        match self {
            Self::NotBuilt => IndexStatus::NotBuilt,
            Self::Ready(index) => IndexStatus::Ready { points: index.len() },
            Self::Unavailable(reason) => IndexStatus::Unavailable { reason: reason.clone() },
        }
    }
}

/// Append-only store of embedded chunks. The only reader and writer of the
/// chunk table.
pub struct ChunkStore {
    conn: Mutex<Connection>,
    config: VectorIndexConfig,
    // Lock order: conn, then index.
    index: Mutex<IndexState>,
}

fn storage(e: rusqlite::Error) -> SemdexError {
    SemdexError::Storage(e.to_string())
}

fn poisoned<T>(_: T) -> SemdexError {
    SemdexError::Storage("store lock poisoned".into())
}

struct StoredRow {
    id: i64,
    doc_name: String,
    chunk_text: String,
    named_entities: String,
    embedding: Vec<u8>,
}

impl StoredRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            doc_name: row.get(1)?,
            chunk_text: row.get(2)?,
            named_entities: row.get(3)?,
            embedding: row.get(4)?,
        })
    }

    fn into_result(self, dim: usize, score: impl Fn(&[f32]) -> f32) -> Result<(i64, SearchResult)> {
        let embedding = decode_embedding(&self.embedding, dim)?;
        let named_entities: NamedEntities = serde_json::from_str(&self.named_entities)
            .map_err(|e| SemdexError::Storage(format!("Corrupt named_entities in row {}: {e}", self.id)))?;
        Ok((
            self.id,
            SearchResult {
                doc_name: self.doc_name,
                chunk_text: self.chunk_text,
                named_entities,
                distance: score(&embedding),
            },
        ))
    }
}

impl ChunkStore {
    /// Open (or create) the database. Call `initialize_schema` before use.
    pub fn open(storage_config: &StorageConfig, config: VectorIndexConfig) -> Result<Self> {
        config.validate()?;
        let conn = if storage_config.is_in_memory() {
            Connection::open_in_memory().map_err(storage)?
        } else {
            let path = storage_config.resolved_path();
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            tracing::info!("Opening chunk store at {}", path.display());
            Connection::open(&path).map_err(storage)?
        };
        Ok(Self {
            conn: Mutex::new(conn),
            config,
            index: Mutex::new(IndexState::NotBuilt),
        })
    }

    pub fn open_in_memory(config: VectorIndexConfig) -> Result<Self> {
        Self::open(&StorageConfig::in_memory(), config)
    }

    pub fn config(&self) -> &VectorIndexConfig {
        &self.config
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(poisoned)
    }

    fn lock_index(&self) -> Result<MutexGuard<'_, IndexState>> {
        self.index.lock().map_err(poisoned)
    }

    /// Create the table if absent and (re)build the ANN index from its rows.
    ///
    /// Safe to call repeatedly. An index that cannot be built is reported in
    /// the returned `SchemaReport` and logged; searches fall back to a scan.
    pub fn initialize_schema(&self) -> Result<SchemaReport> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS document_chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                doc_name TEXT NOT NULL,
                chunk_text TEXT NOT NULL,
                named_entities TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS document_chunks_doc_name_idx
                ON document_chunks (doc_name);
            CREATE TABLE IF NOT EXISTS vector_index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .map_err(storage)?;

        let rows = Self::count_rows(&conn)?;
        self.check_and_record_meta(&conn, rows)?;

        let mut state = self.lock_index()?;
        *state = match self.build_index(&conn) {
            Ok(index) => {
                tracing::info!(
                    "HNSW index ready: {} points, metric={}, m={}, ef_construction={}",
                    index.len(),
                    self.config.metric,
                    self.config.index_build_quality,
                    self.config.index_build_effort
                );
                IndexState::Ready(index)
            }
            Err(reason) => {
                tracing::warn!("Could not create HNSW index, falling back to exact scan: {reason}");
                IndexState::Unavailable(reason)
            }
        };

        Ok(SchemaReport { rows, index: state.status() })
    }

    fn check_and_record_meta(&self, conn: &Connection, rows: usize) -> Result<()> {
        let stored_dim: Option<String> = conn
            .query_row(
                "SELECT value FROM vector_index_meta WHERE key = 'embedding_dim'",
                [],
                |r| r.get(0),
            )
            .optional()
            .map_err(storage)?;

        if let Some(stored) = stored_dim {
            let configured = self.config.embedding_dim.to_string();
            if stored != configured && rows > 0 {
                return Err(SemdexError::Config(format!(
                    "store holds {rows} chunks with embedding_dim={stored}, configured embedding_dim={configured}"
                )));
            }
        }

        let entries = [
            ("embedding_dim", self.config.embedding_dim.to_string()),
            ("metric", self.config.metric.to_string()),
            ("index_build_quality", self.config.index_build_quality.to_string()),
            ("index_build_effort", self.config.index_build_effort.to_string()),
        ];
        for (key, value) in entries {
            conn.execute(
                "INSERT OR REPLACE INTO vector_index_meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(storage)?;
        }
        Ok(())
    }

    fn build_index(&self, conn: &Connection) -> std::result::Result<AnnIndex, String> {
        AnnIndex::check_params(&self.config)?;
        let points = Self::load_embeddings(conn, self.config.embedding_dim).map_err(|e| e.to_string())?;
        AnnIndex::build(&self.config, &points)
    }

    fn load_embeddings(conn: &Connection, dim: usize) -> Result<Vec<(i64, Vec<f32>)>> {
        let mut stmt = conn
            .prepare("SELECT id, embedding FROM document_chunks ORDER BY id")
            .map_err(storage)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?)))
            .map_err(storage)?;
        let mut points = Vec::new();
        for row in rows {
            let (id, bytes) = row.map_err(storage)?;
            points.push((id, decode_embedding(&bytes, dim)?));
        }
        Ok(points)
    }

    fn count_rows(conn: &Connection) -> Result<usize> {
        conn.query_row("SELECT COUNT(*) FROM document_chunks", [], |r| r.get::<_, i64>(0))
            .map(|n| n as usize)
            .map_err(storage)
    }

    fn validate_chunk(&self, chunk: &Chunk) -> Result<()> {
        if chunk.doc_name.trim().is_empty() {
            return Err(SemdexError::Validation("doc_name must not be empty".into()));
        }
        self.config.check_dimension(&chunk.embedding)?;
        if chunk.embedding.iter().any(|v| !v.is_finite()) {
            return Err(SemdexError::Validation("embedding contains non-finite values".into()));
        }
        Ok(())
    }

    /// Append rows to the in-memory index after they are committed. The rows
    /// are already durable, so index trouble only degrades searches to a scan.
    fn index_committed(&self, committed: &[(i64, &[f32])]) {
        let mut state = match self.index.lock() {
            Ok(state) => state,
            Err(poisoned) => {
                tracing::warn!("HNSW index lock poisoned, falling back to exact scan until the next init");
                let mut state = poisoned.into_inner();
                *state = IndexState::Unavailable("index lock poisoned".into());
                self.index.clear_poison();
                return;
            }
        };
        if let IndexState::Ready(index) = &mut *state {
            for (id, vector) in committed {
                if let Err(reason) = index.add(*id, vector) {
                    tracing::warn!("Dropping HNSW index after failed append: {reason}");
                    *state = IndexState::Unavailable(reason);
                    break;
                }
            }
        }
    }

    /// Insert a single chunk.
    pub fn insert(&self, chunk: &Chunk) -> Result<()> {
        self.validate_chunk(chunk)?;
        let entities = serde_json::to_string(&chunk.named_entities)?;

        let conn = self.lock_conn()?;
        conn.execute(
            INSERT_SQL,
            params![chunk.doc_name, chunk.chunk_text, entities, encode_embedding(&chunk.embedding)],
        )
        .map_err(storage)?;
        let id = conn.last_insert_rowid();
        self.index_committed(&[(id, chunk.embedding.as_slice())]);
        Ok(())
    }

    /// Insert all chunks in one transaction. Either every chunk is stored
    /// and the count is returned, or none is.
    pub fn insert_batch(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut prepared = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            self.validate_chunk(chunk)
                .map_err(|e| SemdexError::batch(BatchStage::Validate, Some(i), e))?;
            let entities = serde_json::to_string(&chunk.named_entities)
                .map_err(|e| SemdexError::batch(BatchStage::Validate, Some(i), e.into()))?;
            prepared.push((chunk, entities, encode_embedding(&chunk.embedding)));
        }

        let mut conn = self.lock_conn()?;
        // Dropping `tx` on any early return rolls the batch back.
        let tx = conn
            .transaction()
            .map_err(|e| SemdexError::batch(BatchStage::Begin, None, storage(e)))?;

        let mut ids = Vec::with_capacity(prepared.len());
        {
            let mut stmt = tx
                .prepare_cached(INSERT_SQL)
                .map_err(|e| SemdexError::batch(BatchStage::Write, None, storage(e)))?;
            for (i, (chunk, entities, blob)) in prepared.iter().enumerate() {
                stmt.execute(params![chunk.doc_name, chunk.chunk_text, entities, blob])
                    .map_err(|e| SemdexError::batch(BatchStage::Write, Some(i), storage(e)))?;
                ids.push(tx.last_insert_rowid());
            }
        }

        tx.commit()
            .map_err(|e| SemdexError::batch(BatchStage::Commit, None, storage(e)))?;

        let committed: Vec<(i64, &[f32])> = ids
            .iter()
            .zip(chunks)
            .map(|(id, chunk)| (*id, chunk.embedding.as_slice()))
            .collect();
        self.index_committed(&committed);

        tracing::info!("Committed batch of {} chunks", chunks.len());
        Ok(chunks.len())
    }

    /// Nearest stored chunks to `query_embedding`, ascending by distance.
    ///
    /// With `doc_scope`, only chunks of that document are considered, so up
    /// to `limit` of them come back whenever that many exist.
    pub fn similarity_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        doc_scope: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        self.config.check_dimension(query_embedding)?;
        if query_embedding.iter().any(|v| !v.is_finite()) {
            return Err(SemdexError::Validation("query embedding contains non-finite values".into()));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.lock_conn()?;
        let results = match doc_scope {
            Some(doc) => self.exact_scan(&conn, query_embedding, limit, Some(doc))?,
            None => {
                // One extra candidate shows whether the cutoff falls inside a tie.
                let fetch = limit.saturating_add(1);
                let candidates = {
                    let state = self.lock_index()?;
                    match &*state {
                        IndexState::Ready(index) if !index.is_empty() => {
                            let ids = index.search(query_embedding, fetch);
                            // HNSW came up short of what the table can provide.
                            if ids.len() < fetch.min(index.len()) { None } else { Some(ids) }
                        }
                        _ => None,
                    }
                };
                let mut ranked = match candidates {
                    Some(ids) => self.rank_ids(&conn, query_embedding, &ids, fetch)?,
                    None => Vec::new(),
                };
                if ranked.len() >= limit && !Self::tied_at_cutoff(&ranked, limit) {
                    ranked.truncate(limit);
                    ranked
                } else {
                    self.exact_scan(&conn, query_embedding, limit, None)?
                }
            }
        };

        tracing::debug!(
            "similarity_search: limit={limit}, doc_scope={doc_scope:?}, hits={}",
            results.len()
        );
        Ok(results)
    }

    fn exact_scan(
        &self,
        conn: &Connection,
        query: &[f32],
        limit: usize,
        doc_scope: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        let dim = self.config.embedding_dim;
        let metric = self.config.metric;
        let score = |v: &[f32]| distance(metric, query, v);

        let mut scored = Vec::new();
        let mut collect = |row: rusqlite::Result<StoredRow>| -> Result<()> {
            scored.push(row.map_err(storage)?.into_result(dim, &score)?);
            Ok(())
        };

        const COLUMNS: &str = "SELECT id, doc_name, chunk_text, named_entities, embedding FROM document_chunks";
        match doc_scope {
            Some(doc) => {
                let mut stmt = conn
                    .prepare_cached(&format!("{COLUMNS} WHERE doc_name = ?1"))
                    .map_err(storage)?;
                for row in stmt.query_map(params![doc], StoredRow::from_row).map_err(storage)? {
                    collect(row)?;
                }
            }
            None => {
                let mut stmt = conn.prepare_cached(COLUMNS).map_err(storage)?;
                for row in stmt.query_map([], StoredRow::from_row).map_err(storage)? {
                    collect(row)?;
                }
            }
        }

        Ok(Self::order_and_truncate(scored, limit))
    }

    fn rank_ids(&self, conn: &Connection, query: &[f32], ids: &[i64], limit: usize) -> Result<Vec<SearchResult>> {
        let dim = self.config.embedding_dim;
        let metric = self.config.metric;
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, doc_name, chunk_text, named_entities, embedding FROM document_chunks WHERE id = ?1",
            )
            .map_err(storage)?;

        let mut scored = Vec::with_capacity(ids.len());
        for id in ids {
            let row = stmt
                .query_row(params![id], StoredRow::from_row)
                .optional()
                .map_err(storage)?;
            if let Some(row) = row {
                scored.push(row.into_result(dim, |v| distance(metric, query, v))?);
            }
        }
        Ok(Self::order_and_truncate(scored, limit))
    }

    /// Rows tied with the last kept result may lie outside the candidate set,
    /// so only an exact scan can pick the lowest rowids among them.
    fn tied_at_cutoff(ranked: &[SearchResult], limit: usize) -> bool {
        match (limit.checked_sub(1).and_then(|i| ranked.get(i)), ranked.get(limit)) {
            (Some(last), Some(next)) => last.distance == next.distance,
            _ => false,
        }
    }

    /// Ascending distance, ties by rowid so results are stable for a snapshot.
    fn order_and_truncate(mut scored: Vec<(i64, SearchResult)>, limit: usize) -> Vec<SearchResult> {
        scored.sort_by(|(id_a, a), (id_b, b)| a.distance.total_cmp(&b.distance).then(id_a.cmp(id_b)));
        scored.truncate(limit);
        scored.into_iter().map(|(_, r)| r).collect()
    }

    /// Total stored chunks.
    pub fn count(&self) -> Result<usize> {
        let conn = self.lock_conn()?;
        Self::count_rows(&conn)
    }

    pub fn count_for_doc(&self, doc_name: &str) -> Result<usize> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM document_chunks WHERE doc_name = ?1",
            params![doc_name],
            |r| r.get::<_, i64>(0),
        )
        .map(|n| n as usize)
        .map_err(storage)
    }

    /// `(doc_name, chunk_count)` for every stored document, by name.
    pub fn documents(&self) -> Result<Vec<(String, usize)>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare("SELECT doc_name, COUNT(*) FROM document_chunks GROUP BY doc_name ORDER BY doc_name")
            .map_err(storage)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))
            .map_err(storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
    }

    pub fn index_status(&self) -> Result<IndexStatus> {
        Ok(self.lock_index()?.status())
    }

    /// Drop every stored chunk and recreate an empty schema.
    pub fn reset_schema(&self) -> Result<SchemaReport> {
        {
            let conn = self.lock_conn()?;
            conn.execute_batch(
                "DROP TABLE IF EXISTS document_chunks;
                 DELETE FROM vector_index_meta;",
            )
            .or_else(|e| {
                tracing::warn!("Could not clear index metadata, dropping chunks only: {e}");
                conn.execute_batch("DROP TABLE IF EXISTS document_chunks;")
            })
            .map_err(storage)?;
            tracing::info!("Chunk table dropped");
        }
        self.initialize_schema()
    }
}

impl ChunkSource for ChunkStore {
    fn embedding_dim(&self) -> usize {
        self.config.embedding_dim
    }

    fn similarity_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        doc_scope: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        ChunkStore::similarity_search(self, query_embedding, limit, doc_scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semdex_core::DistanceMetric;

    const DIM: usize = 4;

    fn store() -> ChunkStore {
        let store = ChunkStore::open_in_memory(VectorIndexConfig::with_dim(DIM)).unwrap();
        store.initialize_schema().unwrap();
        store
    }

    fn entities(pairs: &[(&str, &str)]) -> NamedEntities {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn chunk(doc: &str, text: &str, embedding: [f32; DIM]) -> Chunk {
        Chunk::new(doc, text, NamedEntities::new(), embedding.to_vec())
    }

    #[test]
    fn test_initialize_schema_is_idempotent() {
        let store = store();
        store.insert(&chunk("a.txt", "one", [1.0, 0.0, 0.0, 0.0])).unwrap();
        let report = store.initialize_schema().unwrap();
        assert_eq!(report.rows, 1);
        assert_eq!(report.index, IndexStatus::Ready { points: 1 });

        let conn = store.lock_conn().unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'document_chunks'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
        let indexes: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'document_chunks_doc_name_idx'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(indexes, 1);
    }

    #[test]
    fn test_index_unavailable_is_soft() {
        let mut config = VectorIndexConfig::with_dim(DIM);
        config.index_build_quality = 0;
        let store = ChunkStore::open_in_memory(config).unwrap();
        let report = store.initialize_schema().unwrap();
        assert!(matches!(report.index, IndexStatus::Unavailable { .. }));

        store.insert(&chunk("a.txt", "near", [1.0, 0.0, 0.0, 0.0])).unwrap();
        store.insert(&chunk("a.txt", "far", [0.0, 1.0, 0.0, 0.0])).unwrap();
        let hits = store.similarity_search(&[1.0, 0.0, 0.0, 0.0], 2, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_text, "near");
    }

    #[test]
    fn test_insert_and_round_trip_entities() {
        let store = store();
        let c = Chunk::new("lotr.txt", "Frodo left the Shire", entities(&[("Frodo", "PER")]), vec![0.5; DIM]);
        store.insert(&c).unwrap();

        let hits = store.similarity_search(&[0.5; DIM], 1, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_name, "lotr.txt");
        assert_eq!(hits[0].chunk_text, "Frodo left the Shire");
        assert_eq!(hits[0].named_entities, entities(&[("Frodo", "PER")]));
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let store = store();
        for len in [0, DIM - 1, DIM + 1] {
            let bad = Chunk::new("a.txt", "x", NamedEntities::new(), vec![0.1; len]);
            assert!(store.insert(&bad).unwrap_err().is_validation());
            assert!(store.similarity_search(&vec![0.1; len], 3, None).unwrap_err().is_validation());
        }
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_insert_rejects_empty_doc_name() {
        let store = store();
        let err = store.insert(&chunk("  ", "x", [0.0; DIM])).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_insert_batch_returns_count() {
        let store = store();
        let chunks = vec![
            chunk("doc1.txt", "Chunk 1 text", [1.0, 0.0, 0.0, 0.0]),
            chunk("doc2.txt", "Chunk 2 text", [0.0, 1.0, 0.0, 0.0]),
            chunk("doc3.txt", "Chunk 3 text", [0.0, 0.0, 1.0, 0.0]),
        ];
        assert_eq!(store.insert_batch(&chunks).unwrap(), 3);
        assert_eq!(store.count().unwrap(), 3);
        assert_eq!(store.index_status().unwrap(), IndexStatus::Ready { points: 3 });
        assert_eq!(store.insert_batch(&[]).unwrap(), 0);
    }

    #[test]
    fn test_insert_batch_is_atomic_on_validation_failure() {
        let store = store();
        let mut chunks: Vec<Chunk> = (0..6)
            .map(|i| chunk("doc.txt", &format!("part {i}"), [i as f32, 1.0, 0.0, 0.0]))
            .collect();
        chunks[3].embedding = vec![1.0; DIM - 1];

        let err = store.insert_batch(&chunks).unwrap_err();
        match err {
            SemdexError::BatchInsert { stage, index, cause } => {
                assert_eq!(stage, BatchStage::Validate);
                assert_eq!(index, Some(3));
                assert!(cause.is_validation());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_insert_batch_rolls_back_on_write_failure() {
        let store = store();
        store.insert(&chunk("keep.txt", "existing", [1.0, 0.0, 0.0, 0.0])).unwrap();
        {
            let conn = store.lock_conn().unwrap();
            conn.execute_batch(
                "CREATE TRIGGER reject_poison BEFORE INSERT ON document_chunks
                 WHEN NEW.chunk_text = 'poison'
                 BEGIN SELECT RAISE(ABORT, 'poisoned chunk'); END;",
            )
            .unwrap();
        }

        let chunks = vec![
            chunk("doc.txt", "first", [0.0, 1.0, 0.0, 0.0]),
            chunk("doc.txt", "second", [0.0, 0.0, 1.0, 0.0]),
            chunk("doc.txt", "poison", [0.0, 0.0, 0.0, 1.0]),
            chunk("doc.txt", "fourth", [1.0, 1.0, 0.0, 0.0]),
        ];
        let err = store.insert_batch(&chunks).unwrap_err();
        assert!(matches!(
            err,
            SemdexError::BatchInsert { stage: BatchStage::Write, index: Some(2), .. }
        ));
        assert!(err.to_string().contains("poisoned chunk"));

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.count_for_doc("doc.txt").unwrap(), 0);
        assert_eq!(store.index_status().unwrap(), IndexStatus::Ready { points: 1 });
        let hits = store.similarity_search(&[0.0, 0.0, 1.0, 0.0], 10, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_name, "keep.txt");
    }

    #[test]
    fn test_search_empty_store() {
        let store = store();
        assert!(store.similarity_search(&[1.0, 0.0, 0.0, 0.0], 5, None).unwrap().is_empty());
        assert!(store.similarity_search(&[1.0, 0.0, 0.0, 0.0], 5, Some("a.txt")).unwrap().is_empty());
    }

    #[test]
    fn test_search_orders_by_distance_and_limits() {
        let store = store();
        store
            .insert_batch(&[
                chunk("a.txt", "far", [0.0, 1.0, 0.0, 0.0]),
                chunk("a.txt", "exact", [1.0, 0.0, 0.0, 0.0]),
                chunk("a.txt", "close", [0.9, 0.1, 0.0, 0.0]),
            ])
            .unwrap();

        let hits = store.similarity_search(&[1.0, 0.0, 0.0, 0.0], 2, None).unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.chunk_text.as_str()).collect();
        assert_eq!(texts, vec!["exact", "close"]);
        assert!(hits[0].distance <= hits[1].distance);
        assert!(hits.iter().all(|h| h.distance >= 0.0));

        assert_eq!(store.similarity_search(&[1.0, 0.0, 0.0, 0.0], 10, None).unwrap().len(), 3);
        assert!(store.similarity_search(&[1.0, 0.0, 0.0, 0.0], 0, None).unwrap().is_empty());
    }

    #[test]
    fn test_search_ties_are_stable() {
        let store = store();
        store
            .insert_batch(&[
                chunk("a.txt", "first", [0.0, 1.0, 0.0, 0.0]),
                chunk("a.txt", "second", [0.0, 1.0, 0.0, 0.0]),
                chunk("a.txt", "third", [0.0, 1.0, 0.0, 0.0]),
            ])
            .unwrap();
        let first = store.similarity_search(&[0.0, 1.0, 0.0, 0.0], 3, None).unwrap();
        let second = store.similarity_search(&[0.0, 1.0, 0.0, 0.0], 3, None).unwrap();
        assert_eq!(first, second);
        let texts: Vec<&str> = first.iter().map(|h| h.chunk_text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_doc_scope_restricts_results() {
        let store = store();
        let mut chunks = Vec::new();
        for i in 0..5 {
            chunks.push(chunk("A", &format!("a{i}"), [0.0, 1.0, i as f32 * 0.1, 0.0]));
            chunks.push(chunk("B", &format!("b{i}"), [1.0, 0.0, i as f32 * 0.1, 0.0]));
        }
        store.insert_batch(&chunks).unwrap();

        for query in [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], [0.3, 0.3, 0.3, 0.3]] {
            let hits = store.similarity_search(&query, 3, Some("A")).unwrap();
            assert_eq!(hits.len(), 3);
            assert!(hits.iter().all(|h| h.doc_name == "A"));
        }
        assert!(store.similarity_search(&[1.0, 0.0, 0.0, 0.0], 3, Some("C")).unwrap().is_empty());
    }

    #[test]
    fn test_squared_l2_metric() {
        let mut config = VectorIndexConfig::with_dim(2);
        config.metric = DistanceMetric::L2sq;
        let store = ChunkStore::open_in_memory(config).unwrap();
        store.initialize_schema().unwrap();
        store.insert(&Chunk::new("a", "origin", NamedEntities::new(), vec![0.0, 0.0])).unwrap();
        store.insert(&Chunk::new("a", "far", NamedEntities::new(), vec![3.0, 4.0])).unwrap();

        let hits = store.similarity_search(&[0.0, 0.0], 2, None).unwrap();
        assert_eq!(hits[0].chunk_text, "origin");
        assert!((hits[1].distance - 25.0).abs() < 1e-4);
    }

    #[test]
    fn test_ties_past_limit_follow_rowid_on_every_path() {
        let store = store();
        let chunks: Vec<Chunk> = (0..40)
            .map(|i| chunk("same.txt", &format!("c{i}"), [0.5, 0.5, 0.5, 0.5]))
            .collect();
        store.insert_batch(&chunks).unwrap();
        assert!(store.index_status().unwrap().is_ready());

        let query = [0.5, 0.5, 0.5, 0.5];
        let texts = |hits: Vec<SearchResult>| -> Vec<String> { hits.into_iter().map(|h| h.chunk_text).collect() };
        let unscoped = texts(store.similarity_search(&query, 3, None).unwrap());
        let scoped = texts(store.similarity_search(&query, 3, Some("same.txt")).unwrap());
        assert_eq!(unscoped, vec!["c0", "c1", "c2"]);
        assert_eq!(unscoped, scoped);
    }

    #[test]
    fn test_dot_metric_ranks_unnormalized_vectors() {
        let mut config = VectorIndexConfig::with_dim(2);
        config.metric = DistanceMetric::Dot;
        let store = ChunkStore::open_in_memory(config).unwrap();
        store.initialize_schema().unwrap();
        store.insert(&Chunk::new("a", "weak", NamedEntities::new(), vec![2.0, 0.0])).unwrap();
        store.insert(&Chunk::new("a", "strong", NamedEntities::new(), vec![10.0, 0.0])).unwrap();

        let unscoped = store.similarity_search(&[1.0, 0.0], 1, None).unwrap();
        let scoped = store.similarity_search(&[1.0, 0.0], 1, Some("a")).unwrap();
        assert_eq!(unscoped[0].chunk_text, "strong");
        assert_eq!(scoped, unscoped);

        let both = store.similarity_search(&[1.0, 0.0], 2, None).unwrap();
        assert!(both[0].distance < both[1].distance);
        assert!(both[0].distance >= 0.0);
    }

    #[test]
    fn test_poisoned_index_does_not_fail_committed_batch() {
        let store = store();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = store.index.lock().unwrap();
            panic!("index writer crashed");
        }));
        assert!(store.index.is_poisoned());

        let inserted = store
            .insert_batch(&[
                chunk("a.txt", "kept", [1.0, 0.0, 0.0, 0.0]),
                chunk("a.txt", "also kept", [0.0, 1.0, 0.0, 0.0]),
            ])
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.count().unwrap(), 2);
        assert!(matches!(store.index_status().unwrap(), IndexStatus::Unavailable { .. }));

        let hits = store.similarity_search(&[1.0, 0.0, 0.0, 0.0], 1, None).unwrap();
        assert_eq!(hits[0].chunk_text, "kept");

        store.initialize_schema().unwrap();
        assert_eq!(store.index_status().unwrap(), IndexStatus::Ready { points: 2 });
    }

    #[test]
    fn test_documents_and_counts() {
        let store = store();
        store
            .insert_batch(&[
                chunk("b.txt", "1", [1.0, 0.0, 0.0, 0.0]),
                chunk("a.txt", "2", [1.0, 0.0, 0.0, 0.0]),
                chunk("b.txt", "3", [1.0, 0.0, 0.0, 0.0]),
            ])
            .unwrap();
        assert_eq!(store.documents().unwrap(), vec![("a.txt".to_string(), 1), ("b.txt".to_string(), 2)]);
        assert_eq!(store.count_for_doc("b.txt").unwrap(), 2);
    }

    #[test]
    fn test_reset_schema_empties_store() {
        let store = store();
        store.insert(&chunk("a.txt", "x", [1.0, 0.0, 0.0, 0.0])).unwrap();
        let report = store.reset_schema().unwrap();
        assert_eq!(report.rows, 0);
        assert_eq!(report.index, IndexStatus::Ready { points: 0 });
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_reopen_rebuilds_index_and_checks_dimension() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = StorageConfig { path: dir.path().join("chunks.db").to_string_lossy().into_owned() };

        {
            let store = ChunkStore::open(&storage, VectorIndexConfig::with_dim(DIM)).unwrap();
            store.initialize_schema().unwrap();
            store
                .insert_batch(&[
                    chunk("a.txt", "x", [1.0, 0.0, 0.0, 0.0]),
                    chunk("a.txt", "y", [0.0, 1.0, 0.0, 0.0]),
                ])
                .unwrap();
        }

        let store = ChunkStore::open(&storage, VectorIndexConfig::with_dim(DIM)).unwrap();
        let report = store.initialize_schema().unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.index, IndexStatus::Ready { points: 2 });

        let mismatched = ChunkStore::open(&storage, VectorIndexConfig::with_dim(DIM * 2)).unwrap();
        let err = mismatched.initialize_schema().unwrap_err();
        assert!(matches!(err, SemdexError::Config(_)));
    }
}
