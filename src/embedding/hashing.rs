//! Deterministic feature-hashing embedder.
//!
//! Lowercases the input, splits it on non-alphanumeric characters and
//! hashes each token (SHA-256) into one of `dims` buckets with a sign bit,
//! then L2-normalises. No model, no network: useful for air-gapped smoke
//! runs and tests. Lexical overlap is the only signal it captures.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::EmbeddingBackend;
use crate::error::Result;

pub struct HashingBackend {
    dims: usize,
}

impl HashingBackend {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        let lower = text.to_lowercase();

        for token in lower.split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let digest = Sha256::digest(token.as_bytes());
            let mut head = [0u8; 8];
            head.copy_from_slice(&digest[..8]);
            let h = u64::from_le_bytes(head);

            let bucket = (h % self.dims as u64) as usize;
            let sign = if h >> 63 == 1 { -1.0 } else { 1.0 };
            v[bucket] += sign;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl EmbeddingBackend for HashingBackend {
    fn model_name(&self) -> &str {
        "hashing"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_deterministic_and_normalized() {
        let backend = HashingBackend::new(128);
        let a = backend.embed_one("Residency certificate for tenants");
        let b = backend.embed_one("residency CERTIFICATE, for tenants!");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let v = HashingBackend::new(16).embed_one("  ...  ");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_lexical_overlap_ranks_higher() {
        let backend = HashingBackend::new(512);
        let q = backend.embed_one("residency certificate tenant lease");
        let related = backend.embed_one("a tenant needs a lease for the residency certificate");
        let unrelated = backend.embed_one("passport renewal photo appointment");
        assert!(cosine_similarity(&q, &related) > cosine_similarity(&q, &unrelated));
    }

    #[test]
    fn test_handles_arabic_script() {
        let backend = HashingBackend::new(64);
        let v = backend.embed_one("شهادة السكنى");
        assert!(v.iter().any(|x| *x != 0.0));
    }
}
