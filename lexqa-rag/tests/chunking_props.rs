//! Property tests for the chunkers.

use lexqa_rag::{Chunker, Document, FixedSizeChunker, RecursiveChunker};
use proptest::prelude::*;

/// Page text without whitespace, mixing one-, two-, three- and four-byte chars.
fn arb_dense_page() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9.,éü漢字🙂]{1,600}"
}

/// Page text with paragraph, line and word breaks.
fn arb_prose_page() -> impl Strategy<Value = String> {
    "[a-zé漢🙂 \n]{0,800}"
}

/// `(chunk_size, chunk_overlap)` with `overlap < size`.
fn arb_sizes() -> impl Strategy<Value = (usize, usize)> {
    (1usize..200).prop_flat_map(|size| (Just(size), 0..size))
}

fn document(pages: Vec<String>) -> Document {
    Document::from_page_texts("charter.pdf", "data/charter.pdf", pages)
}

/// **Property: fixed-size chunking is deterministic, bounded and overlapping**
/// *For any* document and sizes, chunking twice yields identical chunks;
/// every chunk holds at most `chunk_size` chars; consecutive chunks of a page
/// share exactly `chunk_overlap` chars; and the page text can be rebuilt
/// from its chunks.
mod prop_fixed_size_chunking {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn chunks_are_idempotent_bounded_and_overlap_exactly(
            pages in proptest::collection::vec(arb_dense_page(), 1..4),
            (size, overlap) in arb_sizes(),
        ) {
            let doc = document(pages);
            let chunker = FixedSizeChunker::new(size, overlap).unwrap();
            let chunks = chunker.chunk(&doc);

            prop_assert_eq!(&chunks, &chunker.chunk(&doc));

            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert!(chunk.text.chars().count() <= size);
                prop_assert!(!chunk.text.is_empty());
                prop_assert_eq!(chunk.chunk_index, i);
                prop_assert_eq!(&chunk.id, &format!("charter.pdf#{i}"));
            }

            for page in &doc.pages {
                let on_page: Vec<_> =
                    chunks.iter().filter(|c| c.page_number == page.page_number).collect();
                prop_assert!(!on_page.is_empty());

                let mut rebuilt: Vec<char> = on_page[0].text.chars().collect();
                for pair in on_page.windows(2) {
                    let prev: Vec<char> = pair[0].text.chars().collect();
                    let next: Vec<char> = pair[1].text.chars().collect();
                    prop_assert_eq!(&prev[prev.len() - overlap..], &next[..overlap]);
                    prop_assert_eq!(
                        pair[1].start_index.unwrap() - pair[0].start_index.unwrap(),
                        size - overlap
                    );
                    rebuilt.extend_from_slice(&next[overlap..]);
                }
                prop_assert_eq!(rebuilt.into_iter().collect::<String>(), page.text.clone());
            }
        }

        #[test]
        fn merged_pages_stay_bounded(
            pages in proptest::collection::vec(arb_dense_page(), 1..4),
            (size, overlap) in arb_sizes(),
        ) {
            let doc = document(pages);
            let chunks = FixedSizeChunker::new(size, overlap).unwrap().with_merged_pages(true).chunk(&doc);
            prop_assert!(!chunks.is_empty());
            prop_assert!(chunks.iter().all(|c| c.text.chars().count() <= size));
            prop_assert_eq!(chunks[0].page_number, doc.pages[0].page_number);
        }
    }
}

/// **Property: recursive chunking is deterministic and bounded**
/// *For any* prose-like document, no chunk exceeds `chunk_size` chars or is
/// blank, and chunking twice yields identical chunks.
mod prop_recursive_chunking {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn chunks_are_idempotent_and_bounded(
            pages in proptest::collection::vec(arb_prose_page(), 1..4),
            (size, overlap) in arb_sizes(),
        ) {
            let doc = document(pages);
            let chunker = RecursiveChunker::new(size, overlap).unwrap();
            let chunks = chunker.chunk(&doc);

            prop_assert_eq!(&chunks, &chunker.chunk(&doc));
            for chunk in &chunks {
                prop_assert!(chunk.text.chars().count() <= size);
                prop_assert!(!chunk.text.trim().is_empty());
            }
        }
    }
}
