//! Heuristic entity extractor: capitalized words are entities.

use semdex_core::{EntityExtractor, NamedEntities, Result};

const ENTITY_TYPE: &str = "MISC";

const STOP_WORDS: &[&str] = &[
    "A", "An", "And", "But", "For", "He", "Her", "His", "How", "I", "If", "In", "It", "Its", "My",
    "No", "Not", "Of", "On", "Or", "She", "So", "That", "The", "Their", "There", "They", "This",
    "To", "We", "What", "When", "Where", "Which", "Who", "Why", "With", "You",
];

#[derive(Debug, Default, Clone)]
pub struct CapitalizedEntityExtractor;

impl EntityExtractor for CapitalizedEntityExtractor {
    fn name(&self) -> &str {
        "capitalized"
    }

    fn extract(&self, text: &str) -> Result<NamedEntities> {
        let mut entities = NamedEntities::new();
        for word in text.split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            let mut chars = word.chars();
            let Some(first) = chars.next() else { continue };
            if !first.is_uppercase() || word.chars().count() < 2 || STOP_WORDS.contains(&word) {
                continue;
            }
            entities.insert(word.to_string(), ENTITY_TYPE.to_string());
        }
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_capitalized_words() {
        let text = "'I wish it need not have happened in my time,' said Frodo. 'So do I,' said Gandalf.";
        let entities = CapitalizedEntityExtractor.extract(text).unwrap();
        let forms: Vec<&str> = entities.keys().map(String::as_str).collect();
        assert_eq!(forms, vec!["Frodo", "Gandalf"]);
        assert_eq!(entities["Frodo"], "MISC");
    }

    #[test]
    fn test_duplicates_collapse() {
        let entities = CapitalizedEntityExtractor.extract("Sam and Sam met Sam.").unwrap();
        assert_eq!(entities.len(), 1);
    }

    #[test]
    fn test_no_entities() {
        assert!(CapitalizedEntityExtractor.extract("all lower case here").unwrap().is_empty());
        assert!(CapitalizedEntityExtractor.extract("").unwrap().is_empty());
    }
}
