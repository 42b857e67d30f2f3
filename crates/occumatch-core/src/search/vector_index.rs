//! OMVI: flat inner-product index over L2-normalized embeddings.
//!
//! Layout (little endian):
//! `[magic:4][version:2][dimension:4][count:4][fingerprint:len32+utf8]`
//! `[embedder:len32+utf8][count * dimension f32]`
//!
//! Position `i` in the index is the `i`-th record of the catalog the index
//! was built from; the fingerprint pins that catalog.

use std::cmp::Ordering;
use std::io::{self, Read, Write};
use std::path::Path;

use super::error::{SearchError, SearchResult};

const MAGIC: &[u8; 4] = b"OMVI";
const VERSION: u16 = 1;
const MAX_LABEL_BYTES: u32 = 4096;

/// One search hit: cosine similarity and catalog position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub score: f32,
    pub position: usize,
}

/// Read-only similarity search over catalog positions.
///
/// Implemented by [`VectorIndex`]; tests substitute their own.
pub trait VectorSearch: Send + Sync {
    fn dimension(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `k` neighbors by descending inner product, ties by ascending position
    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor>;

    /// Inner product between `query` and the stored vector at `position`
    fn similarity(&self, query: &[f32], position: usize) -> Option<f32>;
}

/// What a persisted index must agree with to be loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStamp {
    /// Catalog fingerprint
    pub fingerprint: String,
    /// Embedder name
    pub embedder: String,
    pub dimension: usize,
}

/// Scale `v` to unit Euclidean length in place.
///
/// The norm is accumulated in `f64` so tiny and very large components both
/// survive; only an exactly zero or non-finite norm is degenerate.
pub fn l2_normalize(v: &mut [f32]) -> SearchResult<()> {
    let norm = v
        .iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return Err(SearchError::DegenerateVector(format!(
            "norm {norm} over {} components",
            v.len()
        )));
    }
    for x in v.iter_mut() {
        *x = (f64::from(*x) / norm) as f32;
    }
    Ok(())
}

fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// In-memory flat index, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    vectors: Vec<f32>,
    fingerprint: String,
    embedder: String,
}

impl VectorIndex {
    /// Normalize and store `embeddings` in order
    pub fn build(embeddings: Vec<Vec<f32>>, stamp: IndexStamp) -> SearchResult<Self> {
        let dimension = stamp.dimension;
        if dimension == 0 {
            return Err(SearchError::Embedding("dimension must be > 0".into()));
        }
        let mut vectors = Vec::with_capacity(embeddings.len() * dimension);
        for (position, mut embedding) in embeddings.into_iter().enumerate() {
            if embedding.len() != dimension {
                return Err(SearchError::Embedding(format!(
                    "embedding {} has dimension {}, expected {}",
                    position,
                    embedding.len(),
                    dimension
                )));
            }
            l2_normalize(&mut embedding).map_err(|e| match e {
                SearchError::DegenerateVector(msg) => {
                    SearchError::DegenerateVector(format!("record {position}: {msg}"))
                }
                other => other,
            })?;
            vectors.extend_from_slice(&embedding);
        }
        Ok(Self {
            dimension,
            vectors,
            fingerprint: stamp.fingerprint,
            embedder: stamp.embedder,
        })
    }

    pub fn stamp(&self) -> IndexStamp {
        IndexStamp {
            fingerprint: self.fingerprint.clone(),
            embedder: self.embedder.clone(),
            dimension: self.dimension,
        }
    }

    /// Normalized vector stored at `position`
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.vectors.get(start..start + self.dimension)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            32 + self.fingerprint.len() + self.embedder.len() + self.vectors.len() * 4,
        );
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&VERSION.to_le_bytes());
        buf.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        buf.extend_from_slice(&(self.len() as u32).to_le_bytes());
        write_label(&mut buf, &self.fingerprint);
        write_label(&mut buf, &self.embedder);
        for &val in &self.vectors {
            buf.extend_from_slice(&val.to_le_bytes());
        }
        buf
    }

    /// Parse an index, checking only its internal consistency
    pub fn from_bytes(data: &[u8]) -> SearchResult<Self> {
        parse(data).map_err(|e| SearchError::IndexCorrupt(e.to_string()))
    }

    /// Write the index atomically (temp file, then rename)
    pub fn save(&self, path: &Path) -> SearchResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("omvi.tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&self.to_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, path)?;
        log::debug!(
            "[VectorIndex] Saved {} vectors ({}d) to {}",
            self.len(),
            self.dimension,
            path.display()
        );
        Ok(())
    }

    /// Load an index and refuse it unless it matches `expected`
    pub fn load(path: &Path, expected: &IndexStamp) -> SearchResult<Self> {
        let data = std::fs::read(path)?;
        let index = Self::from_bytes(&data)?;

        if index.dimension != expected.dimension {
            return Err(SearchError::IndexCorrupt(format!(
                "stored dimension {} disagrees with provider dimension {}",
                index.dimension, expected.dimension
            )));
        }
        if index.embedder != expected.embedder {
            return Err(SearchError::IndexCorrupt(format!(
                "index built with embedder {}, current embedder is {}",
                index.embedder, expected.embedder
            )));
        }
        if index.fingerprint != expected.fingerprint {
            return Err(SearchError::IndexCorrupt(
                "catalog fingerprint changed since the index was built".to_string(),
            ));
        }
        Ok(index)
    }
}

impl VectorSearch for VectorIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.vectors.len() / self.dimension
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        if query.len() != self.dimension || k == 0 {
            return Vec::new();
        }
        let mut scored: Vec<Neighbor> = self
            .vectors
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, vec)| Neighbor {
                score: dot_product(query, vec),
                position,
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        scored.truncate(k);
        scored
    }

    fn similarity(&self, query: &[f32], position: usize) -> Option<f32> {
        if query.len() != self.dimension {
            return None;
        }
        self.vector(position).map(|v| dot_product(query, v))
    }
}

fn write_label(buf: &mut Vec<u8>, label: &str) {
    buf.extend_from_slice(&(label.len() as u32).to_le_bytes());
    buf.extend_from_slice(label.as_bytes());
}

fn read_u32(cursor: &mut io::Cursor<&[u8]>) -> io::Result<u32> {
    let mut b = [0u8; 4];
    cursor.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_label(cursor: &mut io::Cursor<&[u8]>) -> io::Result<String> {
    let len = read_u32(cursor)?;
    if len > MAX_LABEL_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("label length {len} too large"),
        ));
    }
    let mut bytes = vec![0u8; len as usize];
    cursor.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn parse(data: &[u8]) -> io::Result<VectorIndex> {
    let mut cursor = io::Cursor::new(data);
    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad OMVI magic"));
    }
    let mut ver_buf = [0u8; 2];
    cursor.read_exact(&mut ver_buf)?;
    let version = u16::from_le_bytes(ver_buf);
    if version != VERSION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported OMVI version: {}", version),
        ));
    }
    let dimension = read_u32(&mut cursor)? as usize;
    let count = read_u32(&mut cursor)? as usize;
    if dimension == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "zero dimension"));
    }
    let fingerprint = read_label(&mut cursor)?;
    let embedder = read_label(&mut cursor)?;

    let payload = &data[cursor.position() as usize..];
    let expected_bytes = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "size overflow"))?;
    if payload.len() != expected_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "payload is {} bytes, expected {} for {} x {}",
                payload.len(),
                expected_bytes,
                count,
                dimension
            ),
        ));
    }
    let vectors = payload
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(VectorIndex {
        dimension,
        vectors,
        fingerprint,
        embedder,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(dimension: usize) -> IndexStamp {
        IndexStamp {
            fingerprint: "abc123".to_string(),
            embedder: "test-embedder".to_string(),
            dimension,
        }
    }

    fn sample() -> VectorIndex {
        VectorIndex::build(
            vec![
                vec![3.0, 4.0, 0.0],
                vec![0.0, 2.0, 0.0],
                vec![1.0, 1.0, 1.0],
                vec![0.0, 0.0, -5.0],
            ],
            stamp(3),
        )
        .unwrap()
    }

    #[test]
    fn build_normalizes_every_vector() {
        let idx = sample();
        for position in 0..idx.len() {
            let v = idx.vector(position).unwrap();
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-6);
        }
        let v = idx.vector(0).unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn build_rejects_zero_vector() {
        let err = VectorIndex::build(vec![vec![1.0, 0.0], vec![0.0, 0.0]], stamp(2)).unwrap_err();
        match err {
            SearchError::DegenerateVector(msg) => assert!(msg.contains("record 1")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn normalize_accepts_tiny_nonzero_vector() {
        let mut v = [1e-8f32, 0.0];
        l2_normalize(&mut v).unwrap();
        assert!((v[0] - 1.0).abs() < 1e-6);
        assert_eq!(v[1], 0.0);
    }

    #[test]
    fn normalize_accepts_huge_components() {
        let mut v = [1e20f32, 1e20];
        l2_normalize(&mut v).unwrap();
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert!((v[0] - expected).abs() < 1e-6);
        assert!((v[1] - expected).abs() < 1e-6);
    }

    #[test]
    fn normalize_rejects_zero_and_nan() {
        assert!(matches!(
            l2_normalize(&mut [0.0, 0.0]),
            Err(SearchError::DegenerateVector(_))
        ));
        assert!(matches!(
            l2_normalize(&mut [f32::NAN, 1.0]),
            Err(SearchError::DegenerateVector(_))
        ));
    }

    #[test]
    fn build_rejects_ragged_dimensions() {
        let err = VectorIndex::build(vec![vec![1.0, 0.0], vec![1.0]], stamp(2)).unwrap_err();
        assert!(matches!(err, SearchError::Embedding(_)));
    }

    #[test]
    fn build_is_idempotent() {
        let a = sample();
        let b = sample();
        assert_eq!(a, b);
        let mut q = vec![0.2, 0.9, -0.1];
        l2_normalize(&mut q).unwrap();
        assert_eq!(a.search(&q, 4), b.search(&q, 4));
    }

    #[test]
    fn search_orders_by_score_then_position() {
        // positions 0 and 2 are identical, so they tie
        let idx = VectorIndex::build(
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![2.0, 0.0], vec![1.0, 1.0]],
            stamp(2),
        )
        .unwrap();
        let hits = idx.search(&[1.0, 0.0], 4);
        let positions: Vec<usize> = hits.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![0, 2, 3, 1]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn search_k_larger_than_index_returns_all() {
        let idx = sample();
        assert_eq!(idx.search(&[1.0, 0.0, 0.0], 100).len(), 4);
        assert_eq!(idx.search(&[1.0, 0.0, 0.0], 2).len(), 2);
        assert!(idx.search(&[1.0, 0.0], 2).is_empty());
    }

    #[test]
    fn self_similarity_is_one() {
        let idx = sample();
        for position in 0..idx.len() {
            let v = idx.vector(position).unwrap().to_vec();
            let s = idx.similarity(&v, position).unwrap();
            assert!((s - 1.0).abs() < 1e-6);
            assert_eq!(idx.search(&v, 1)[0].position, position);
        }
        assert!(idx.similarity(&[1.0, 0.0, 0.0], 99).is_none());
    }

    #[test]
    fn persistence_roundtrip_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.omvi");
        let idx = sample();
        idx.save(&path).unwrap();
        let loaded = VectorIndex::load(&path, &stamp(3)).unwrap();
        assert_eq!(idx, loaded);

        let mut query = vec![0.3, -0.2, 0.9];
        l2_normalize(&mut query).unwrap();
        assert_eq!(idx.search(&query, 4), loaded.search(&query, 4));
    }

    #[test]
    fn load_rejects_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.omvi");
        sample().save(&path).unwrap();
        let err = VectorIndex::load(&path, &stamp(4)).unwrap_err();
        match err {
            SearchError::IndexCorrupt(msg) => assert!(msg.contains("dimension")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn load_rejects_stale_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.omvi");
        sample().save(&path).unwrap();
        let expected = IndexStamp {
            fingerprint: "different".to_string(),
            ..stamp(3)
        };
        let err = VectorIndex::load(&path, &expected).unwrap_err();
        assert!(matches!(err, SearchError::IndexCorrupt(_)));
    }

    #[test]
    fn bad_magic_and_truncation_are_corrupt() {
        let mut data = sample().to_bytes();
        let truncated = &data[..data.len() - 3];
        assert!(matches!(
            VectorIndex::from_bytes(truncated),
            Err(SearchError::IndexCorrupt(_))
        ));
        data[0] = b'X';
        let err = VectorIndex::from_bytes(&data).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn l2_normalize_unit() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v).unwrap();
        assert!((v[0] - 0.6).abs() < 0.001);
        assert!((v[1] - 0.8).abs() < 0.001);
        let mut zero = vec![0.0, 0.0];
        assert!(matches!(
            l2_normalize(&mut zero),
            Err(SearchError::DegenerateVector(_))
        ));
    }
}
