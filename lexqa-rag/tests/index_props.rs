//! Property tests for vector search and index persistence.

use std::collections::HashSet;
use std::path::PathBuf;

use lexqa_rag::{Chunk, EmbeddingModelInfo, IndexEntry, VectorIndex, store};
use proptest::prelude::*;

const DIMS: usize = 8;

fn chunk(i: usize) -> Chunk {
    Chunk {
        id: format!("udhr.pdf#{i}"),
        text: format!("Article {i}."),
        start_index: Some(i * 800),
        document_id: "udhr.pdf".to_string(),
        source_path: PathBuf::from("data/udhr.pdf"),
        page_number: i / 3 + 1,
        chunk_index: i,
    }
}

fn arb_vector() -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0, DIMS)
}

fn arb_index() -> impl Strategy<Value = VectorIndex> {
    proptest::collection::vec(arb_vector(), 0..40).prop_map(|vectors| {
        let entries =
            vectors.into_iter().enumerate().map(|(i, v)| IndexEntry::new(v, chunk(i))).collect();
        VectorIndex::build("udhr", EmbeddingModelInfo::new("mock", "bag-of-words", DIMS), entries)
            .unwrap()
    })
}

/// **Property: search returns the best `min(k, n)` entries in order**
/// *For any* index, query and `k`, results are sorted by descending score,
/// hold `min(k, n)` distinct entries, and no omitted entry outscores the
/// last returned one.
mod prop_search {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_are_sorted_bounded_and_best(
            index in arb_index(),
            query in arb_vector(),
            k in 0usize..50,
        ) {
            let results = index.search(&query, k).unwrap();
            prop_assert_eq!(results.len(), k.min(index.len()));

            for pair in results.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }

            let ids: HashSet<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
            prop_assert_eq!(ids.len(), results.len());

            if let Some(last) = results.last() {
                for entry in index.entries() {
                    if !ids.contains(entry.chunk.id.as_str()) {
                        let score = lexqa_rag::cosine_similarity(&entry.vector, &query);
                        prop_assert!(score <= last.score);
                    }
                }
            }
        }

        #[test]
        fn identical_vectors_keep_insertion_order(
            vector in arb_vector(),
            n in 1usize..20,
        ) {
            let entries = (0..n).map(|i| IndexEntry::new(vector.clone(), chunk(i))).collect();
            let index = VectorIndex::build(
                "udhr",
                EmbeddingModelInfo::new("mock", "bag-of-words", DIMS),
                entries,
            )
            .unwrap();

            let order: Vec<usize> =
                index.search(&vector, n).unwrap().iter().map(|r| r.chunk.chunk_index).collect();
            prop_assert_eq!(order, (0..n).collect::<Vec<_>>());
        }
    }
}

/// **Property: a saved index searches exactly like the one saved**
/// *For any* index, loading it back from disk yields the same model identity,
/// the same entries and the same search results.
mod prop_persistence {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(25))]

        #[test]
        fn save_then_load_preserves_search(
            index in arb_index(),
            query in arb_vector(),
            k in 1usize..10,
        ) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("db");
            store::save(&index, &path).unwrap();
            let loaded = store::load(&path).unwrap();

            prop_assert_eq!(loaded.model(), index.model());
            prop_assert_eq!(loaded.entries(), index.entries());
            prop_assert_eq!(loaded.search(&query, k).unwrap(), index.search(&query, k).unwrap());
        }
    }
}
