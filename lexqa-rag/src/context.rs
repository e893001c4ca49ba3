//! Context assembly: retrieved chunks to a single prompt block.

use crate::document::SearchResult;

/// Placed in the prompt when retrieval found nothing.
pub const NO_RELEVANT_CONTEXT: &str = "No relevant documents found in the database.";

/// Separator between consecutive chunk texts.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Join chunk texts in result order, separated by a blank line.
///
/// An empty slice yields [`NO_RELEVANT_CONTEXT`].
pub fn assemble_context(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return NO_RELEVANT_CONTEXT.to_string();
    }
    results.iter().map(|r| r.chunk.text.as_str()).collect::<Vec<_>>().join(CONTEXT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;
    use std::path::PathBuf;

    fn result(text: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk: Chunk {
                id: format!("doc#{text}"),
                text: text.to_string(),
                start_index: None,
                document_id: "doc".to_string(),
                source_path: PathBuf::from("doc.txt"),
                page_number: 1,
                chunk_index: 0,
            },
            score,
        }
    }

    #[test]
    fn joins_in_result_order() {
        let context = assemble_context(&[result("Article 20", 0.9), result("Article 21", 0.5)]);
        assert_eq!(context, "Article 20\n\nArticle 21");
    }

    #[test]
    fn empty_results_yield_sentinel() {
        assert_eq!(assemble_context(&[]), NO_RELEVANT_CONTEXT);
    }
}
