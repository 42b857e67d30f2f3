//! Embedding provider seam.
use futures::future::BoxFuture;

use super::error::{SearchError, SearchResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedderInfo {
    pub name: String,
    pub dimension: usize,
}

/// Deterministic text → fixed-dimension vector mapping.
///
/// `embed_batch` returns one vector per input, in input order. Inputs that
/// are empty after trimming are rejected with [`SearchError::Embedding`].
pub trait Embedder: Send + Sync {
    fn info(&self) -> EmbedderInfo;

    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, SearchResult<Vec<Vec<f32>>>>;

    fn dimension(&self) -> usize {
        self.info().dimension
    }

    fn embed_one<'a>(&'a self, text: &'a str) -> BoxFuture<'a, SearchResult<Vec<f32>>> {
        Box::pin(async move {
            let texts = [text.to_string()];
            self.embed_batch(&texts)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| SearchError::Embedding("No embedding returned".to_string()))
        })
    }
}

/// Clip `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Reject blank inputs before they reach a provider.
pub fn ensure_non_blank(texts: &[String]) -> SearchResult<()> {
    if let Some(i) = texts.iter().position(|t| t.trim().is_empty()) {
        return Err(SearchError::Embedding(format!(
            "input {i} is empty after trimming"
        )));
    }
    Ok(())
}

/// Check provider output against the batch it was asked to embed.
pub fn check_output(
    vectors: &[Vec<f32>],
    expected_count: usize,
    dimension: usize,
) -> SearchResult<()> {
    if vectors.len() != expected_count {
        return Err(SearchError::Embedding(format!(
            "Embedding count mismatch: sent {} texts, got {} embeddings",
            expected_count,
            vectors.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(SearchError::Embedding(format!(
            "dimension mismatch: expected {}, got {}",
            dimension,
            bad.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
    }

    #[test]
    fn blank_inputs_rejected() {
        let texts = vec!["ok".to_string(), "   ".to_string()];
        let err = ensure_non_blank(&texts).unwrap_err();
        assert!(err.to_string().contains("input 1"));
        assert!(ensure_non_blank(&["a".to_string()]).is_ok());
    }

    #[test]
    fn output_shape_checked() {
        let vectors = vec![vec![0.0; 4], vec![0.0; 3]];
        assert!(check_output(&vectors, 3, 4).is_err());
        let err = check_output(&vectors, 2, 4).unwrap_err();
        assert!(err.to_string().contains("expected 4, got 3"));
    }
}
