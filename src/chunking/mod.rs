//! Chunking for Docent
//!
//! PDF text is laid out page by page with `[Page n]` markers (see [`pdf`]),
//! then cut into fixed-width character windows. Each window remembers the
//! page it starts on so answers can cite their sources.

pub mod pdf;

pub use pdf::{extract_pages, extract_text_from_pdf, layout_pages};

/// Chunk size parameters
pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_MAX_CHUNKS: usize = 50;

const PAGE_MARKER: &str = "[Page ";

/// Document metadata for chunking context
#[derive(Debug, Clone)]
pub struct DocMetadata {
    pub document_id: String,
    pub file_name: String,
}

/// A chunk of content with metadata
#[derive(Debug, Clone)]
pub struct Chunk {
    /// `{file_name}_page_{chunk_index}`
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Metadata for a chunk
#[derive(Debug, Clone)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub file_name: String,
    /// 1-based position of the chunk in the document
    pub chunk_index: u32,
    /// PDF page the chunk starts on
    pub page: u32,
    pub content_hash: String,
}

/// Fixed-width character chunker
#[derive(Debug, Clone)]
pub struct FixedChunker {
    pub chunk_size: usize,
    pub max_chunks: usize,
}

impl FixedChunker {
    pub fn new(chunk_size: usize, max_chunks: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            max_chunks,
        }
    }

    /// Slice `content` into consecutive windows of `chunk_size` characters.
    ///
    /// Only the first `max_chunks` windows are kept; the tail of a long
    /// document is dropped.
    pub fn chunk(&self, content: &str, metadata: &DocMetadata) -> Vec<Chunk> {
        let markers = page_markers(content);
        let mut chunks = Vec::new();

        for (start, end) in char_windows(content, self.chunk_size).take(self.max_chunks) {
            let index = chunks.len() as u32 + 1;
            let text = &content[start..end];
            let page = page_at(&markers, start, end).unwrap_or(index);

            chunks.push(Chunk {
                id: format!("{}_page_{}", metadata.file_name, index),
                content: text.to_string(),
                metadata: ChunkMetadata {
                    document_id: metadata.document_id.clone(),
                    file_name: metadata.file_name.clone(),
                    chunk_index: index,
                    page,
                    content_hash: content_hash(text),
                },
            });
        }

        chunks
    }
}

impl Default for FixedChunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CHUNKS)
    }
}

/// md5 of the chunk text, hex encoded
pub fn content_hash(content: &str) -> String {
    format!("{:x}", md5::compute(content.as_bytes()))
}

/// Byte ranges of consecutive `size`-character windows
fn char_windows(content: &str, size: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
    let mut boundaries: Vec<usize> = content
        .char_indices()
        .map(|(i, _)| i)
        .step_by(size)
        .collect();
    boundaries.push(content.len());

    let windows: Vec<(usize, usize)> = boundaries
        .windows(2)
        .map(|w| (w[0], w[1]))
        .filter(|(s, e)| e > s)
        .collect();
    windows.into_iter()
}

/// (byte offset, page number) of every `[Page n]` marker
fn page_markers(content: &str) -> Vec<(usize, u32)> {
    let mut markers = Vec::new();
    let mut from = 0;

    while let Some(found) = content[from..].find(PAGE_MARKER) {
        let at = from + found;
        let rest = &content[at + PAGE_MARKER.len()..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();

        if !digits.is_empty() && rest[digits.len()..].starts_with(']') {
            if let Ok(page) = digits.parse() {
                markers.push((at, page));
            }
        }
        from = at + PAGE_MARKER.len();
    }

    markers
}

/// Page of the last marker at or before `start`, else the first marker inside the chunk
fn page_at(markers: &[(usize, u32)], start: usize, end: usize) -> Option<u32> {
    markers
        .iter()
        .take_while(|(at, _)| *at <= start)
        .last()
        .or_else(|| markers.iter().find(|(at, _)| *at < end))
        .map(|(_, page)| *page)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_doc() -> DocMetadata {
        DocMetadata {
            document_id: "doc1".to_string(),
            file_name: "manual".to_string(),
        }
    }

    #[test]
    fn test_fixed_windows() {
        let chunker = FixedChunker::new(4, 50);
        let chunks = chunker.chunk("abcdefghij", &test_doc());

        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["abcd", "efgh", "ij"]);
        assert_eq!(chunks[0].id, "manual_page_1");
        assert_eq!(chunks[2].id, "manual_page_3");
        assert_eq!(chunks[2].metadata.chunk_index, 3);
    }

    #[test]
    fn test_max_chunks_cap() {
        let chunker = FixedChunker::new(10, 50);
        let text = "x".repeat(10 * 80);
        let chunks = chunker.chunk(&text, &test_doc());
        assert_eq!(chunks.len(), 50);
        assert_eq!(chunks.last().unwrap().id, "manual_page_50");
    }

    #[test]
    fn test_empty_text() {
        let chunks = FixedChunker::default().chunk("", &test_doc());
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_multibyte_text_is_split_on_chars() {
        let chunker = FixedChunker::new(3, 50);
        let chunks = chunker.chunk("héllo wörld ✓", &test_doc());

        let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, "héllo wörld ✓");
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 3));
        assert_eq!(chunks[0].content, "hél");
    }

    #[test]
    fn test_page_from_markers() {
        let text = layout_pages(&[
            "a".repeat(30),
            "b".repeat(30),
            "c".repeat(30),
        ]);
        let chunker = FixedChunker::new(20, 50);
        let chunks = chunker.chunk(&text, &test_doc());

        assert_eq!(chunks[0].metadata.page, 1);
        let last = chunks.last().unwrap();
        assert_eq!(last.metadata.page, 3);
        assert!(chunks.iter().any(|c| c.content.contains('b') && c.metadata.page == 2));
    }

    #[test]
    fn test_page_falls_back_to_index() {
        let chunker = FixedChunker::new(5, 50);
        let chunks = chunker.chunk("no markers in this text", &test_doc());
        assert_eq!(chunks[1].metadata.page, 2);
    }

    #[test]
    fn test_malformed_marker_ignored() {
        let markers = page_markers("[Page x] [Page 12] [Page 3");
        assert_eq!(markers, vec![(9, 12)]);
    }

    #[test]
    fn test_content_hash_stable() {
        assert_eq!(content_hash("hello"), "5d41402abc4b2a76b9719d911017c592");
    }
}
