//! FNV-1a feature-hashing embedder, the offline default provider.
//!
//! Each lower-cased word contributes one bucket for the whole token plus one
//! per boundary-marked character trigram (`<so`, `sof`, ..., `re>`), so short
//! codes like `2` still produce a non-zero vector.
use futures::future::BoxFuture;

use super::embedder::{check_output, ensure_non_blank, truncate_chars, Embedder, EmbedderInfo};
use super::error::SearchResult;

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001B3;
const WORD_WEIGHT: f32 = 2.0;

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
    max_chars: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "dimension must be > 0");
        Self {
            dimension,
            max_chars: 2048,
        }
    }

    #[must_use]
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        assert!(max_chars > 0);
        self.max_chars = max_chars;
        self
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lower = truncate_chars(text, self.max_chars).to_lowercase();
        for word in lower.split_whitespace() {
            self.add_feature(&mut vector, word.as_bytes(), WORD_WEIGHT);
            let marked: Vec<char> = std::iter::once('<')
                .chain(word.chars())
                .chain(std::iter::once('>'))
                .collect();
            for window in marked.windows(3) {
                let gram: String = window.iter().collect();
                self.add_feature(&mut vector, gram.as_bytes(), 1.0);
            }
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], bytes: &[u8], weight: f32) {
        let h = fnv1a(bytes);
        let bucket = (h % self.dimension as u64) as usize;
        let sign = if (h >> 32) & 1 == 0 { 1.0f32 } else { -1.0f32 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(768)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

impl Embedder for HashEmbedder {
    fn info(&self) -> EmbedderInfo {
        EmbedderInfo {
            // max_chars changes the output, so it is part of the identity
            name: format!("fnv1a-hash-{}-c{}", self.dimension, self.max_chars),
            dimension: self.dimension,
        }
    }

    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, SearchResult<Vec<Vec<f32>>>> {
        Box::pin(async move {
            ensure_non_blank(texts)?;
            let vectors: Vec<Vec<f32>> = texts.iter().map(|t| self.embed_text(t)).collect();
            check_output(&vectors, texts.len(), self.dimension)?;
            Ok(vectors)
        })
    }
}
