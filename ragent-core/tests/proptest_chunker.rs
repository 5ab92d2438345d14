//! Property tests for chunk sizing and overlap.

use proptest::prelude::*;
use ragent_core::{Chunker, ChunkingConfig, Document};

fn sizes() -> impl Strategy<Value = (usize, usize)> {
    (1usize..80).prop_flat_map(|size| (Just(size), 0..size))
}

fn text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            4 => proptest::char::range('a', 'z'),
            2 => Just(' '),
            1 => Just('\n'),
            1 => Just('.'),
            1 => Just('!'),
            1 => Just('é'),
            1 => Just('日'),
        ],
        0..400,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

proptest! {
    #[test]
    fn chunks_never_exceed_chunk_size((size, overlap) in sizes(), text in text()) {
        let chunker = Chunker::new(ChunkingConfig::new(size, overlap)).unwrap();
        for chunk in chunker.split_text(&text) {
            prop_assert!(chunk.chars().count() <= size);
            prop_assert!(!chunk.is_empty());
        }
    }

    #[test]
    fn consecutive_chunks_overlap_exactly((size, overlap) in sizes(), text in text()) {
        let chunker = Chunker::new(ChunkingConfig::new(size, overlap)).unwrap();
        let chunks: Vec<Vec<char>> = chunker
            .split_text(&text)
            .iter()
            .map(|c| c.chars().collect())
            .collect();
        for pair in chunks.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            prop_assert!(prev.len() > overlap);
            prop_assert_eq!(&prev[prev.len() - overlap..], &next[..overlap]);
        }
    }

    #[test]
    fn chunks_reconstruct_the_document((size, overlap) in sizes(), text in text()) {
        prop_assume!(!text.trim().is_empty());
        let chunker = Chunker::new(ChunkingConfig::new(size, overlap)).unwrap();
        let chunks = chunker.split_text(&text);
        prop_assert!(!chunks.is_empty());

        let mut rebuilt: String = chunks[0].clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.chars().skip(overlap));
        }
        prop_assert_eq!(rebuilt, text);
    }

    #[test]
    fn split_documents_keeps_document_order(texts in proptest::collection::vec(text(), 1..5)) {
        let chunker = Chunker::new(ChunkingConfig::new(40, 8)).unwrap();
        let docs: Vec<Document> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Document::new(t.clone()).with_metadata("source", format!("doc{i}")))
            .collect();

        let sources: Vec<String> = chunker
            .split_documents(&docs)
            .iter()
            .map(|c| c.source().unwrap_or_default().to_string())
            .collect();
        let mut sorted = sources.clone();
        sorted.sort();
        prop_assert_eq!(sources, sorted);
    }
}
