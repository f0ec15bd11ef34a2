//! Overlapping, boundary-aware text chunking.
//!
//! Chunks are measured in characters (Unicode scalar values) and sliced verbatim from the
//! input, so nothing is normalized or lost:
//!
//! - Every chunk holds at most `chunk_size` characters and is never empty.
//! - Each chunk after the first begins exactly `overlap` characters before the end of its
//!   predecessor. Dropping those leading characters and concatenating rebuilds the input.
//! - A chunk prefers to end right after a paragraph break, then a line break, then a sentence
//!   end, then a space; only when none of these fall inside the admissible window is the text
//!   cut at the hard size limit.

use super::types::ChunkingError;

/// Boundary classes in order of preference; a chunk ends right after the separator.
const BOUNDARIES: &[&[&str]] = &[&["\n\n"], &["\n"], &[". ", "! ", "? "], &[" "]];

/// A contiguous span of the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Verbatim chunk text.
    pub text: &'a str,
    /// Zero-based position of the chunk within the document.
    pub ordinal: usize,
    /// Character offset of the chunk's first character in the source text.
    pub char_start: usize,
}

/// Iterator over the chunks of a text, produced by [`chunk_text`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    /// Byte offset of every character, plus a final entry for `text.len()`.
    offsets: Vec<usize>,
    chunk_size: usize,
    overlap: usize,
    next_start: usize,
    ordinal: usize,
}

/// Split `text` into chunks of at most `chunk_size` characters overlapping by `overlap`.
///
/// Returns an error when `chunk_size` is zero or `overlap` is not smaller than `chunk_size`.
/// Empty input yields no chunks.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Chunks<'_>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if overlap >= chunk_size {
        return Err(ChunkingError::OverlapTooLarge {
            overlap,
            chunk_size,
        });
    }

    let mut offsets: Vec<usize> = text.char_indices().map(|(offset, _)| offset).collect();
    offsets.push(text.len());

    Ok(Chunks {
        text,
        offsets,
        chunk_size,
        overlap,
        next_start: 0,
        ordinal: 0,
    })
}

impl Chunks<'_> {
    fn char_len(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Pick the end (exclusive, in characters) of a chunk starting at `start`.
    ///
    /// The end must leave more than `overlap` characters in the chunk so the next start moves
    /// forward.
    fn cut_point(&self, start: usize) -> usize {
        let hard_end = start + self.chunk_size;
        let min_end = start + self.overlap + 1;
        let window_start = self.offsets[start];
        let window = &self.text[window_start..self.offsets[hard_end]];

        for separators in BOUNDARIES {
            let best = separators
                .iter()
                .filter_map(|separator| {
                    window
                        .rfind(separator)
                        .map(|position| window_start + position + separator.len())
                })
                .filter_map(|byte_end| self.offsets.binary_search(&byte_end).ok())
                .filter(|&end| end >= min_end)
                .max();
            if let Some(end) = best {
                return end;
            }
        }

        hard_end
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.char_len();
        let start = self.next_start;
        if start >= total {
            return None;
        }

        let end = if total - start <= self.chunk_size {
            total
        } else {
            self.cut_point(start)
        };

        let text: &'a str = self.text;
        let chunk = Chunk {
            text: &text[self.offsets[start]..self.offsets[end]],
            ordinal: self.ordinal,
            char_start: start,
        };

        self.ordinal += 1;
        self.next_start = if end == total {
            total
        } else {
            end - self.overlap
        };
        Some(chunk)
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(text: &str, size: usize, overlap: usize) -> Vec<Chunk<'_>> {
        chunk_text(text, size, overlap).expect("valid params").collect()
    }

    fn reconstruct(chunks: &[Chunk<'_>], overlap: usize) -> String {
        let mut rebuilt = String::new();
        for (index, chunk) in chunks.iter().enumerate() {
            if index == 0 {
                rebuilt.push_str(chunk.text);
            } else {
                rebuilt.extend(chunk.text.chars().skip(overlap));
            }
        }
        rebuilt
    }

    fn assert_invariants(text: &str, size: usize, overlap: usize) {
        let chunks = collect(text, size, overlap);
        assert_eq!(
            reconstruct(&chunks, overlap),
            text,
            "lossless reconstruction failed for size={size} overlap={overlap}"
        );
        for chunk in &chunks {
            let len = chunk.text.chars().count();
            assert!(len > 0, "empty chunk");
            assert!(len <= size, "chunk of {len} exceeds {size}");
        }
        for pair in chunks.windows(2) {
            let previous: Vec<char> = pair[0].text.chars().collect();
            let tail: String = previous[previous.len() - overlap..].iter().collect();
            let head: String = pair[1].text.chars().take(overlap).collect();
            assert_eq!(tail, head, "consecutive chunks must share {overlap} chars");
            assert_eq!(pair[1].ordinal, pair[0].ordinal + 1);
        }
    }

    fn sample_corpus() -> Vec<String> {
        let prose = "The sky is blue. Grass is green! Is the ocean deep? Yes.\n\
                     Rivers run to the sea.\n\nMountains rise above the clouds and \
                     valleys fall below them. "
            .repeat(7);
        let unicode = "Überprüfung der Daten – ünïcödé ✓ 日本語のテキスト。 ".repeat(23);
        let unbroken = "x".repeat(1_733);
        let lines = (0..120)
            .map(|i| format!("line {i}: value {}\n", i * 7))
            .collect::<String>();
        vec![prose, unicode, unbroken, lines, "short".to_string()]
    }

    #[test]
    fn chunks_reconstruct_input_losslessly() {
        for text in sample_corpus() {
            for (size, overlap) in [(800, 200), (50, 10), (17, 16), (5, 0), (1, 0), (64, 63)] {
                assert_invariants(&text, size, overlap);
            }
        }
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(collect("", 10, 2).is_empty());
    }

    #[test]
    fn short_input_is_a_single_chunk() {
        let chunks = collect("The sky is blue. Grass is green.", 800, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "The sky is blue. Grass is green.");
        assert_eq!(chunks[0].ordinal, 0);
    }

    #[test]
    fn prefers_paragraph_breaks_over_spaces() {
        let text = "alpha beta gamma\n\ndelta epsilon zeta eta theta";
        let chunks = collect(text, 24, 0);
        assert_eq!(chunks[0].text, "alpha beta gamma\n\n");
    }

    #[test]
    fn prefers_sentence_end_over_word_break() {
        let text = "One two. Three four five six seven";
        let chunks = collect(text, 20, 0);
        assert_eq!(chunks[0].text, "One two. ");
    }

    #[test]
    fn falls_back_to_hard_cut_without_boundaries() {
        let chunks = collect("abcdefghij", 4, 1);
        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text).collect();
        assert_eq!(texts, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn never_splits_inside_a_multibyte_character() {
        let chunks = collect("ééééé", 2, 1);
        assert!(chunks.iter().all(|chunk| chunk.text.chars().count() <= 2));
        assert_eq!(reconstruct(&chunks, 1), "ééééé");
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(matches!(
            chunk_text("hello", 0, 0),
            Err(ChunkingError::InvalidChunkSize)
        ));
        assert!(matches!(
            chunk_text("hello", 4, 4),
            Err(ChunkingError::OverlapTooLarge {
                overlap: 4,
                chunk_size: 4
            })
        ));
    }

    #[test]
    fn char_start_tracks_overlap() {
        let chunks = collect("abcdefghij", 4, 1);
        let starts: Vec<usize> = chunks.iter().map(|chunk| chunk.char_start).collect();
        assert_eq!(starts, vec![0, 3, 6]);
    }
}
