//! Typed records shared by the store and the retriever.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entity surface form → entity type (e.g. `"Frodo" → "PER"`).
pub type NamedEntities = BTreeMap<String, String>;

/// One unit of document text with its annotations, as handed to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub doc_name: String,
    pub chunk_text: String,
    #[serde(default)]
    pub named_entities: NamedEntities,
    pub embedding: Vec<f32>,
}

impl Chunk {
    pub fn new(
        doc_name: impl Into<String>,
        chunk_text: impl Into<String>,
        named_entities: NamedEntities,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            doc_name: doc_name.into(),
            chunk_text: chunk_text.into(),
            named_entities,
            embedding,
        }
    }
}

/// A similarity search hit. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub doc_name: String,
    pub chunk_text: String,
    pub named_entities: NamedEntities,
    /// Non-negative; smaller is more similar.
    pub distance: f32,
}

impl SearchResult {
    /// Number of entity surface forms shared with `entities`.
    pub fn entity_overlap(&self, entities: &NamedEntities) -> usize {
        entities
            .keys()
            .filter(|form| self.named_entities.contains_key(*form))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities(forms: &[&str]) -> NamedEntities {
        forms.iter().map(|f| (f.to_string(), "PER".to_string())).collect()
    }

    #[test]
    fn test_entity_overlap_counts_surface_forms() {
        let hit = SearchResult {
            doc_name: "lotr.txt".into(),
            chunk_text: "Frodo and Sam".into(),
            named_entities: entities(&["Frodo", "Sam"]),
            distance: 0.3,
        };
        assert_eq!(hit.entity_overlap(&entities(&["Frodo", "Baggins"])), 1);
        assert_eq!(hit.entity_overlap(&entities(&["Gandalf"])), 0);
        assert_eq!(hit.entity_overlap(&NamedEntities::new()), 0);
    }

    #[test]
    fn test_overlap_ignores_entity_type() {
        let mut mine = NamedEntities::new();
        mine.insert("Shire".into(), "LOC".into());
        let hit = SearchResult {
            doc_name: "d".into(),
            chunk_text: "t".into(),
            named_entities: mine,
            distance: 0.0,
        };
        let mut query = NamedEntities::new();
        query.insert("Shire".into(), "ORG".into());
        assert_eq!(hit.entity_overlap(&query), 1);
    }
}
