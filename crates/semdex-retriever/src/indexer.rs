//! Document ingestion: chunk, annotate, persist atomically.
//!
//! Chunking and per-chunk annotation tolerate failures (the rest of the
//! document still gets indexed); persistence is all-or-nothing.

use semdex_core::{Chunk, Chunker, Embedder, EntityExtractor, Result, SemdexError};
use semdex_store::ChunkStore;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Conversion,
    Chunking,
    ChunkProcessing,
    Indexing,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Conversion => "conversion",
            Self::Chunking => "chunking",
            Self::ChunkProcessing => "chunk processing",
            Self::Indexing => "indexing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Indexed,
    NothingToIndex,
    Failed { stage: IngestStage, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub doc_name: String,
    /// Fragments the chunker yielded.
    pub produced: usize,
    /// Fragments dropped because annotation failed.
    pub skipped: usize,
    pub inserted: usize,
    pub chunking_error: Option<String>,
    pub outcome: IngestOutcome,
}

impl IngestReport {
    fn new(doc_name: &str) -> Self {
        Self {
            doc_name: doc_name.to_string(),
            produced: 0,
            skipped: 0,
            inserted: 0,
            chunking_error: None,
            outcome: IngestOutcome::NothingToIndex,
        }
    }

    pub fn failed(doc_name: &str, stage: IngestStage, message: impl Into<String>) -> Self {
        Self {
            outcome: IngestOutcome::Failed { stage, message: message.into() },
            ..Self::new(doc_name)
        }
    }

    /// Report for a document whose source could not be turned into text.
    pub fn conversion_failed(doc_name: &str, message: impl Into<String>) -> Self {
        Self::failed(doc_name, IngestStage::Conversion, message)
    }

    pub fn is_success(&self) -> bool {
        self.outcome == IngestOutcome::Indexed
    }

    /// Human-readable progress message.
    pub fn summary(&self) -> String {
        let mut out = format!("Processing {}...\n", self.doc_name);
        if let IngestOutcome::Failed { stage: IngestStage::Conversion, .. } = self.outcome {
            out.push_str("Failed to convert document");
            return out;
        }
        if self.chunking_error.is_some() || self.skipped > 0 {
            out.push_str(&format!(
                "Failed to process {} of {} chunks. Will try to index the rest of the document.\n",
                self.skipped + usize::from(self.chunking_error.is_some()),
                self.produced + usize::from(self.chunking_error.is_some())
            ));
        }
        match &self.outcome {
            IngestOutcome::Indexed => {
                out.push_str(&format!("Document indexed successfully ({} chunks).", self.inserted));
            }
            IngestOutcome::NothingToIndex => out.push_str("No chunks to index."),
            IngestOutcome::Failed { stage, message } => {
                out.push_str(&format!("Failed to index document ({stage}): {message}"));
            }
        }
        out
    }
}

/// Document name from a file path or URL: its last path segment.
pub fn doc_name_from_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(trimmed)
        .to_string()
}

pub struct DocumentIndexer {
    store: Arc<ChunkStore>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn EntityExtractor>,
}

impl DocumentIndexer {
    pub fn new(
        store: Arc<ChunkStore>,
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn EntityExtractor>,
    ) -> Self {
        Self { store, chunker, embedder, extractor }
    }

    fn annotate(&self, doc_name: &str, text: String) -> Result<Chunk> {
        let named_entities = self.extractor.extract(&text)?;
        let embedding = self
            .embedder
            .encode(&[text.as_str()])?
            .into_iter()
            .next()
            .ok_or_else(|| SemdexError::Embedding(format!("{} returned no vector", self.embedder.name())))?;
        Ok(Chunk::new(doc_name, text, named_entities, embedding))
    }

    /// Like `index_document`, but rejected input becomes a failed report so
    /// a caller working through many documents can keep going.
    pub fn index_or_report(&self, doc_name: &str, text: &str) -> IngestReport {
        self.index_document(doc_name, text).unwrap_or_else(|e| {
            tracing::warn!("Rejected document {doc_name}: {e}");
            IngestReport::failed(doc_name, IngestStage::Chunking, e.to_string())
        })
    }

    /// Index one document's text. Only invalid input is an `Err`; stage
    /// failures are reported in the returned `IngestReport`.
    pub fn index_document(&self, doc_name: &str, text: &str) -> Result<IngestReport> {
        if doc_name.trim().is_empty() {
            return Err(SemdexError::Validation("doc_name must not be empty".into()));
        }
        if text.trim().is_empty() {
            return Err(SemdexError::Validation(format!("{doc_name} has no text to index")));
        }

        let mut report = IngestReport::new(doc_name);
        let mut rows = Vec::new();

        for fragment in self.chunker.chunk(text) {
            let fragment = match fragment {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!("Failed to process chunks of {doc_name}: {e}");
                    report.chunking_error = Some(e.to_string());
                    break;
                }
            };
            report.produced += 1;
            match self.annotate(doc_name, fragment) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    tracing::warn!("Skipping chunk {} of {doc_name}: {e}", report.produced - 1);
                    report.skipped += 1;
                }
            }
        }

        if rows.is_empty() {
            if report.produced > 0 {
                report.outcome = IngestOutcome::Failed {
                    stage: IngestStage::ChunkProcessing,
                    message: "every chunk failed to process".into(),
                };
            } else if let Some(err) = &report.chunking_error {
                report.outcome = IngestOutcome::Failed {
                    stage: IngestStage::Chunking,
                    message: err.clone(),
                };
            }
            return Ok(report);
        }

        match self.store.insert_batch(&rows) {
            Ok(inserted) => {
                tracing::info!("Indexed {inserted} chunks from {doc_name}");
                report.inserted = inserted;
                report.outcome = IngestOutcome::Indexed;
            }
            Err(e) => {
                tracing::warn!("Failed to index document {doc_name}: {e}");
                report.outcome = IngestOutcome::Failed {
                    stage: IngestStage::Indexing,
                    message: e.to_string(),
                };
            }
        }
        Ok(report)
    }
}
