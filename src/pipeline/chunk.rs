//! Paragraph-preserving text chunking.
//!
//! Translation and speech APIs cap the size of a single request. [`split`]
//! cuts a long text into ordered [`TextChunk`]s below a character limit,
//! keeping whole lines together wherever they fit.
//!
//! ## Algorithm
//!
//! 1. Break the text on line breaks; trim each line and drop blank ones.
//! 2. Greedily append lines (joined by one space) to the current chunk while
//!    the result stays strictly below `limit` characters.
//! 3. When the next line does not fit, emit the current chunk and start a new
//!    one with that line.
//!
//! A single line that is itself `limit` characters or longer is emitted whole
//! as its own chunk; it is never cut mid-line.
//!
//! Markup and OCR extraction produce one long line, and translated text is
//! rejoined with spaces. [`break_long_lines`] gives such text sentence-level
//! line breaks before it is split, so a whole book does not end up as one
//! oversized chunk.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::str::Lines;

/// One ordered slice of a larger text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Zero-based position in the chunk sequence.
    pub index: usize,
    pub text: String,
}

impl TextChunk {
    /// Length in characters, the unit chunk limits are expressed in.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Split `text` into chunks below `limit` characters.
///
/// The returned iterator is lazy and borrows `text`; each call to `split`
/// (or each `clone()` of the iterator) starts over from the beginning.
///
/// # Panics
/// Never; a `limit` of 0 behaves like 1 (every line becomes its own chunk).
pub fn split(text: &str, limit: usize) -> Chunks<'_> {
    Chunks {
        lines: text.lines(),
        limit: limit.max(1),
        pending: None,
        next_index: 0,
    }
}

/// Lazy iterator returned by [`split`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    lines: Lines<'a>,
    limit: usize,
    /// Line that did not fit into the previous chunk.
    pending: Option<&'a str>,
    next_index: usize,
}

impl Iterator for Chunks<'_> {
    type Item = TextChunk;

    fn next(&mut self) -> Option<TextChunk> {
        let mut current = String::new();
        let mut current_len = 0usize;

        if let Some(line) = self.pending.take() {
            current.push_str(line);
            current_len = line.chars().count();
        }

        for line in self.lines.by_ref() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let line_len = line.chars().count();

            // Length after appending, including the joining space.
            let joined_len = if current.is_empty() {
                line_len
            } else {
                current_len + 1 + line_len
            };

            if joined_len < self.limit {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(line);
                current_len = joined_len;
            } else if current.is_empty() {
                // Oversized line: emit it whole as its own chunk.
                current.push_str(line);
                break;
            } else {
                self.pending = Some(line);
                break;
            }
        }

        if current.is_empty() {
            return None;
        }

        let chunk = TextChunk {
            index: self.next_index,
            text: current,
        };
        self.next_index += 1;
        Some(chunk)
    }
}

static RE_SENTENCE_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([.!?;:…。！？]["'”’)\]]*)[ \t]+"#)
        .expect("valid regex")
});

/// Put a line break after every sentence in lines of `limit` characters or
/// more. Shorter lines are left alone; the text's words are unchanged.
pub fn break_long_lines(text: &str, limit: usize) -> Cow<'_, str> {
    let limit = limit.max(1);
    if text.lines().all(|l| l.chars().count() < limit) {
        return Cow::Borrowed(text);
    }
    let broken: Vec<Cow<'_, str>> = text
        .lines()
        .map(|line| {
            if line.chars().count() < limit {
                Cow::Borrowed(line)
            } else {
                RE_SENTENCE_END.replace_all(line, "$1\n")
            }
        })
        .collect();
    Cow::Owned(broken.join("\n"))
}

/// Number of chunks a chunked stage cuts `text` into at `limit`.
pub fn chunk_count(text: &str, limit: usize) -> usize {
    split(&break_long_lines(text, limit), limit).count()
}

/// Join chunk payloads in index order with single spaces.
///
/// Input order does not matter; chunks are sorted by `index` first.
pub fn join_chunks(chunks: &mut [TextChunk]) -> String {
    chunks.sort_by_key(|c| c.index);
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(text: &str, limit: usize) -> Vec<String> {
        split(text, limit).map(|c| c.text).collect()
    }

    fn collapse_ws(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks: Vec<_> = split("Hello world.\nSecond paragraph.", 4500).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Hello world. Second paragraph.");
    }

    #[test]
    fn empty_and_blank_input_yield_nothing() {
        assert!(texts("", 10).is_empty());
        assert!(texts("\n   \n\t\n", 10).is_empty());
    }

    #[test]
    fn paragraphs_are_grouped_greedily() {
        // "aaaa bbbb" is 9 chars (< 10) so they share a chunk; "cccc" does not fit.
        assert_eq!(
            texts("aaaa\nbbbb\ncccc", 10),
            vec!["aaaa bbbb".to_string(), "cccc".to_string()]
        );
    }

    #[test]
    fn chunk_exactly_at_limit_is_not_allowed() {
        // "aaaa bbbbb" would be 10 chars == limit → split.
        assert_eq!(texts("aaaa\nbbbbb", 10), vec!["aaaa", "bbbbb"]);
    }

    #[test]
    fn oversized_paragraph_is_isolated() {
        let long = "x".repeat(25);
        let text = format!("short\n{long}\ntail");
        let chunks = texts(&text, 10);
        assert_eq!(chunks, vec!["short".to_string(), long.clone(), "tail".to_string()]);
    }

    #[test]
    fn oversized_first_paragraph_does_not_emit_empty_chunk() {
        let long = "y".repeat(12);
        let chunks = texts(&format!("{long}\nz"), 5);
        assert_eq!(chunks, vec![long, "z".to_string()]);
    }

    #[test]
    fn indices_are_contiguous() {
        let text = (0..50).map(|i| format!("line number {i}")).collect::<Vec<_>>().join("\n");
        let idx: Vec<usize> = split(&text, 40).map(|c| c.index).collect();
        assert_eq!(idx, (0..idx.len()).collect::<Vec<_>>());
    }

    #[test]
    fn chunks_stay_below_limit_unless_isolated() {
        let text = "The quick brown fox.\nJumps over\n\nthe lazy dog while the farmer sleeps soundly.\nEnd."
            .repeat(7);
        let limit = 30;
        let paragraphs: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        for chunk in split(&text, limit) {
            if chunk.char_len() >= limit {
                assert!(
                    paragraphs.contains(&chunk.text.as_str()),
                    "oversized chunk must be a single paragraph: {:?}",
                    chunk.text
                );
            }
        }
    }

    #[test]
    fn joining_reconstructs_content() {
        let text = "  First   line  \n\nSecond line\r\nThird\n   \nFourth and last line  ";
        for limit in [1, 5, 12, 20, 100] {
            let mut chunks: Vec<_> = split(text, limit).collect();
            assert_eq!(collapse_ws(&join_chunks(&mut chunks)), collapse_ws(text), "limit {limit}");
        }
    }

    #[test]
    fn limit_counts_characters_not_bytes() {
        // Four 2-byte chars joined: "éé éé" is 5 chars, 9 bytes.
        assert_eq!(texts("éé\néé", 6), vec!["éé éé"]);
    }

    #[test]
    fn iterator_is_restartable() {
        let text = "a\nb\nc";
        let it = split(text, 2);
        let first: Vec<_> = it.clone().collect();
        let second: Vec<_> = it.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn short_lines_are_not_rebroken() {
        let text = "One. Two.\nThree.";
        assert!(matches!(break_long_lines(text, 100), Cow::Borrowed(_)));
    }

    #[test]
    fn long_line_is_broken_at_sentences() {
        let text = "First sentence here. Second one! Third? \"Quoted.\" Last";
        let broken = break_long_lines(text, 20);
        assert_eq!(
            broken,
            "First sentence here.\nSecond one!\nThird?\n\"Quoted.\"\nLast"
        );
        let chunks = texts(&broken, 40);
        assert!(chunks.iter().all(|c| c.chars().count() < 40), "{chunks:?}");
        assert_eq!(collapse_ws(&chunks.join(" ")), collapse_ws(text));
    }

    #[test]
    fn unbreakable_line_stays_whole() {
        let text = "a".repeat(50);
        assert_eq!(break_long_lines(&text, 10), text);
    }

    #[test]
    fn chunk_count_matches_stage_splitting() {
        assert_eq!(chunk_count("", 10), 0);
        assert_eq!(chunk_count("aaaa\nbbbb\ncccc", 10), 2);
        assert_eq!(chunk_count("One two. Three four. Five six.", 12), 3);
    }

    #[test]
    fn join_sorts_by_index() {
        let mut chunks = vec![
            TextChunk { index: 1, text: "world".into() },
            TextChunk { index: 0, text: "hello".into() },
        ];
        assert_eq!(join_chunks(&mut chunks), "hello world");
    }
}
