//! Paragraph-packing chunker.

use semdex_core::{Chunker, Result};

pub const DEFAULT_MAX_CHARS: usize = 500;

/// Packs blank-line separated paragraphs into fragments of at most
/// `max_chars` characters; longer paragraphs are split on whitespace.
#[derive(Debug, Clone)]
pub struct ParagraphChunker {
    max_chars: usize,
}

impl Default for ParagraphChunker {
    fn default() -> Self {
        Self { max_chars: DEFAULT_MAX_CHARS }
    }
}

impl ParagraphChunker {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars: max_chars.max(1) }
    }

    fn pieces(&self, paragraph: &str) -> Vec<String> {
        if paragraph.chars().count() <= self.max_chars {
            return vec![paragraph.to_string()];
        }
        let mut pieces = Vec::new();
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let word_len = word.chars().count();
            let needed = if current.is_empty() {
                word_len
            } else {
                current.chars().count() + 1 + word_len
            };
            if needed > self.max_chars && !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            pieces.push(current);
        }
        pieces
    }
}

impl Chunker for ParagraphChunker {
    fn name(&self) -> &str {
        "paragraph"
    }

    fn chunk<'a>(&'a self, text: &'a str) -> Box<dyn Iterator<Item = Result<String>> + 'a> {
        let mut paragraphs = text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .flat_map(move |p| self.pieces(p))
            .peekable();

        Box::new(std::iter::from_fn(move || {
            let mut current = paragraphs.next()?;
            while let Some(next) = paragraphs.peek() {
                if current.chars().count() + 2 + next.chars().count() > self.max_chars {
                    break;
                }
                current.push_str("\n\n");
                current.push_str(next);
                paragraphs.next();
            }
            Some(Ok(current))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(chunker: &ParagraphChunker, text: &str) -> Vec<String> {
        chunker.chunk(text).collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn test_packs_short_paragraphs() {
        let chunker = ParagraphChunker::new(20);
        let out = chunks(&chunker, "one\n\ntwo\n\nthree is longer text");
        assert_eq!(out, vec!["one\n\ntwo".to_string(), "three is longer text".to_string()]);
    }

    #[test]
    fn test_splits_long_paragraph_on_whitespace() {
        let chunker = ParagraphChunker::new(10);
        let out = chunks(&chunker, "alpha beta gamma delta");
        assert_eq!(out, vec!["alpha beta", "gamma", "delta"]);
        assert!(out.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        let chunker = ParagraphChunker::default();
        assert!(chunks(&chunker, "  \n\n  ").is_empty());
    }
}
