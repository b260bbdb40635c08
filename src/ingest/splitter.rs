//! Overlapping text chunking with provenance propagation.

use crate::rag::store::PageRef;

/// Provenance carried by every chunk from the loader through the
/// splitter to the store. Each stage re-asserts these fields instead of
/// trusting earlier stages to have preserved them.
#[derive(Debug, Clone)]
pub struct ChunkProvenance {
    /// Original filename.
    pub source: String,
    /// 1-based page number or the "N/A" sentinel, never absent.
    pub page: PageRef,
    pub org_slug: Option<String>,
    pub org_id: Option<String>,
}

/// A chunk derived from one page section.
#[derive(Debug, Clone)]
pub struct SplitChunk {
    pub text: String,
    /// Character offset of the window start within the section.
    pub start_offset: usize,
    pub chunk_index: usize,
    pub provenance: ChunkProvenance,
}

/// Splits text into overlapping windows of `chunk_size` characters
/// advancing by `chunk_size - chunk_overlap`.
///
/// Windows may be snapped back to a sentence boundary, but only within
/// the trailing `chunk_overlap` characters: anything cut from a window
/// is still covered by the next window, so the chunks always cover the
/// section with no gaps.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

const SENTENCE_ENDINGS: [&str; 6] = [". ", "! ", "? ", ".\n", "!\n", "?\n"];

impl TextSplitter {
    /// `chunk_overlap` must be strictly smaller than `chunk_size`
    /// (validated in settings) or splitting could not make forward
    /// progress.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        debug_assert!(chunk_size > 0);
        debug_assert!(chunk_overlap < chunk_size);
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn split(&self, text: &str, provenance: &ChunkProvenance) -> Vec<SplitChunk> {
        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();

        let mut chunks = Vec::new();
        if total_chars == 0 {
            return chunks;
        }

        let step = self.chunk_size.saturating_sub(self.chunk_overlap).max(1);
        let mut start = 0;
        let mut chunk_index = 0;

        while start < total_chars {
            let end = (start + self.chunk_size).min(total_chars);
            let window: String = chars[start..end].iter().collect();

            let final_text = if end < total_chars {
                snap_to_sentence(&window, self.chunk_overlap)
            } else {
                window
            };

            // Keep the window verbatim: trimming would nibble at the
            // guaranteed overlap coverage. Whitespace-only windows are
            // skipped entirely.
            if !final_text.trim().is_empty() {
                chunks.push(SplitChunk {
                    text: final_text,
                    start_offset: start,
                    chunk_index,
                    provenance: provenance.clone(),
                });
                chunk_index += 1;
            }

            start += step;
        }

        chunks
    }
}

/// Cut the window back to the last sentence ending found within its
/// final `max_trim` characters; return it unchanged when none exists.
fn snap_to_sentence(window: &str, max_trim: usize) -> String {
    if max_trim == 0 {
        return window.to_string();
    }

    let char_count = window.chars().count();
    let search_from = char_count.saturating_sub(max_trim);
    let byte_start = window
        .char_indices()
        .nth(search_from)
        .map(|(byte, _)| byte)
        .unwrap_or(0);

    let search_text = &window[byte_start..];
    for ending in SENTENCE_ENDINGS.iter() {
        if let Some(pos) = search_text.rfind(ending) {
            let cut = byte_start + pos + ending.len();
            return window[..cut].to_string();
        }
    }

    window.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provenance() -> ChunkProvenance {
        ChunkProvenance {
            source: "report.pdf".to_string(),
            page: PageRef::Number(2),
            org_slug: Some("acme".to_string()),
            org_id: Some("org-1".to_string()),
        }
    }

    #[test]
    fn splits_3000_chars_into_four_overlapping_chunks() {
        let splitter = TextSplitter::new(1000, 200);
        let text = "a".repeat(3000);

        let chunks = splitter.split(&text, &provenance());

        assert_eq!(chunks.len(), 4);
        let offsets: Vec<usize> = chunks.iter().map(|c| c.start_offset).collect();
        assert_eq!(offsets, vec![0, 800, 1600, 2400]);
        assert_eq!(chunks[0].text.len(), 1000);
        assert_eq!(chunks[3].text.len(), 600);
    }

    #[test]
    fn consecutive_chunks_share_the_overlap() {
        let splitter = TextSplitter::new(100, 20);
        let text: String = ('a'..='z').cycle().take(300).collect();

        let chunks = splitter.split(&text, &provenance());
        assert!(chunks.len() >= 2);

        for pair in chunks.windows(2) {
            let prev_tail: String = pair[0].text.chars().rev().take(20).collect::<Vec<_>>()
                .into_iter().rev().collect();
            let next_head: String = pair[1].text.chars().take(20).collect();
            assert_eq!(prev_tail, next_head);
        }
    }

    #[test]
    fn coverage_has_no_gaps_even_with_sentence_snapping() {
        let splitter = TextSplitter::new(100, 30);
        // Sentence endings land inside the trailing overlap window of
        // each chunk, so snapping is exercised.
        let sentence = "The quick brown fox jumps over the dog. ";
        let text = sentence.repeat(12);

        let chunks = splitter.split(&text, &provenance());
        assert!(chunks.len() >= 2);

        let step = 100 - 30;
        for (i, pair) in chunks.windows(2).enumerate() {
            // Window i may have been cut, but never by more than the
            // overlap; its text must still reach the next window start.
            let covered_to = pair[0].start_offset + pair[0].text.chars().count();
            assert!(
                covered_to >= pair[1].start_offset,
                "gap after chunk {}: covered to {}, next starts at {}",
                i,
                covered_to,
                pair[1].start_offset
            );
            assert_eq!(pair[1].start_offset - pair[0].start_offset, step);
        }
    }

    #[test]
    fn every_chunk_carries_provenance() {
        let splitter = TextSplitter::new(50, 10);
        let text = "x".repeat(200);

        let chunks = splitter.split(&text, &provenance());
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert_eq!(chunk.provenance.source, "report.pdf");
            assert_eq!(chunk.provenance.page, PageRef::Number(2));
            assert_eq!(chunk.provenance.org_slug.as_deref(), Some("acme"));
        }
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let splitter = TextSplitter::new(1000, 200);
        assert!(splitter.split("", &provenance()).is_empty());
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let splitter = TextSplitter::new(1000, 200);
        let chunks = splitter.split("just a little text", &provenance());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "just a little text");
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        let splitter = TextSplitter::new(40, 10);
        let text = "füllwörter über die Straße. ".repeat(20);
        let chunks = splitter.split(&text, &provenance());
        assert!(!chunks.is_empty());
    }
}
