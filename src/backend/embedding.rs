//! Deterministic text embedding by feature hashing.
//!
//! Each lowercase alphanumeric token is hashed with FNV-1a into one of
//! `dimension` buckets; the top hash bit picks the sign. The vector is then
//! L2-normalised, so cosine distance is `1 - dot`. The hash is fixed across
//! processes and platforms, which keeps vectors written to Chroma comparable
//! with vectors computed by later runs.

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Feature-hashing embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Default vector width, matching common sentence-embedding models.
    pub const DEFAULT_DIMENSION: usize = 384;

    /// Creates an embedder producing vectors of `dimension` components.
    ///
    /// A zero dimension is clamped to 1.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Returns the vector width.
    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embeds one text.
    ///
    /// Text without any alphanumeric token is hashed as a whole, so the
    /// result is never the zero vector.
    #[must_use]
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        let mut tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .peekable();

        if tokens.peek().is_none() {
            self.accumulate(&mut vector, text.trim());
        } else {
            for token in tokens {
                self.accumulate(&mut vector, &token.to_lowercase());
            }
        }

        normalise(&mut vector);
        vector
    }

    /// Embeds a batch of texts.
    #[must_use]
    pub fn embed_all(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn accumulate(&self, vector: &mut [f32], token: &str) {
        let hash = fnv1a(token.as_bytes());
        #[allow(clippy::cast_possible_truncation)] // Remainder is below dimension, a usize
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSION)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

fn normalise(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine distance (`1 - cosine similarity`) between two vectors.
///
/// Mismatched lengths, empty or zero vectors have distance 1.
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        1.0
    } else {
        1.0 - dot / denom
    }
}
