/// Splits text into overlapping windows of whitespace-separated words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(200, 20)
    }
}

impl TextChunker {
    /// `chunk_overlap` is clamped below `chunk_size` so every window advances.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let step = self.chunk_size - self.chunk_overlap;
        let mut chunks = Vec::new();

        let mut start = 0;
        while start < words.len() {
            let end = (start + self.chunk_size).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end == words.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_windows_cover_all_words() {
        let chunker = TextChunker::new(4, 1);
        let chunks = chunker.chunk("a b c d e f g");
        assert_eq!(chunks, vec!["a b c d", "d e f g"]);
    }

    #[test]
    fn no_trailing_chunk_fully_inside_previous() {
        let chunker = TextChunker::new(3, 2);
        let chunks = chunker.chunk("one two three four");
        assert_eq!(chunks, vec!["one two three", "two three four"]);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(TextChunker::default().chunk("   \n ").is_empty());
    }

    #[test]
    fn overlap_is_clamped() {
        let chunker = TextChunker::new(2, 5);
        assert_eq!(chunker.chunk("a b c"), vec!["a b", "b c"]);
    }
}
