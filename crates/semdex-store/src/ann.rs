//! HNSW index over stored embeddings, keyed by table rowid.

use hnsw_rs::prelude::*;
use semdex_core::{DistanceMetric, VectorIndexConfig};

use crate::distance::distance;

/// Layer cap for the HNSW graph (hnsw_rs maximum).
const MAX_LAYERS: usize = 16;
const MIN_QUALITY: usize = 2;
const MAX_QUALITY: usize = 256;
/// Capacity hint floor so small tables still get a sensible layer scale.
const MIN_CAPACITY: usize = 1_000;

/// Adapts the configured metric to hnsw_rs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricDistance(pub DistanceMetric);

impl Distance<f32> for MetricDistance {
    fn eval(&self, va: &[f32], vb: &[f32]) -> f32 {
        distance(self.0, va, vb)
    }
}

pub struct AnnIndex {
    hnsw: Hnsw<'static, f32, MetricDistance>,
    dimension: usize,
    search_effort: usize,
    len: usize,
}

impl AnnIndex {
    /// Check the build parameters without touching any data.
    pub fn check_params(config: &VectorIndexConfig) -> Result<(), String> {
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&config.index_build_quality) {
            return Err(format!(
                "index_build_quality must be in {MIN_QUALITY}..={MAX_QUALITY}, got {}",
                config.index_build_quality
            ));
        }
        if config.index_build_effort == 0 {
            return Err("index_build_effort must be at least 1".into());
        }
        Ok(())
    }

    /// Build the index from `(rowid, embedding)` pairs.
    ///
    /// The error is the reason the index is unavailable; callers treat it as
    /// a degraded state, not a failure.
    pub fn build(config: &VectorIndexConfig, points: &[(i64, Vec<f32>)]) -> Result<Self, String> {
        Self::check_params(config)?;

        let capacity = points.len().max(MIN_CAPACITY);
        let hnsw = Hnsw::new(
            config.index_build_quality,
            capacity,
            MAX_LAYERS,
            config.index_build_effort,
            MetricDistance(config.metric),
        );
        let mut index = Self {
            hnsw,
            dimension: config.embedding_dim,
            search_effort: config.index_build_effort,
            len: 0,
        };
        for (id, vector) in points {
            index.add(*id, vector)?;
        }
        index.hnsw.set_searching_mode(true);
        Ok(index)
    }

    pub fn add(&mut self, id: i64, vector: &[f32]) -> Result<(), String> {
        if vector.len() != self.dimension {
            return Err(format!(
                "vector for row {id} has {} dimensions, index expects {}",
                vector.len(),
                self.dimension
            ));
        }
        let data_id = usize::try_from(id).map_err(|_| format!("row id {id} cannot key the index"))?;
        self.hnsw.insert((vector, data_id));
        self.len += 1;
        Ok(())
    }

    /// Approximate `k` nearest row ids. Order is not guaranteed; callers
    /// re-rank by exact distance.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<i64> {
        if k == 0 || self.len == 0 {
            return Vec::new();
        }
        let ef = self.search_effort.max(k);
        self.hnsw
            .search(query, k, ef)
            .into_iter()
            .filter_map(|n| i64::try_from(n.d_id).ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
