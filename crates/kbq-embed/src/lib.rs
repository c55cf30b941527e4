use tracing::info;

use kbq_core::config::{EmbeddingProviderKind, EmbeddingSettings};
use kbq_core::traits::Embedder;
use kbq_core::{Error, Result};

pub mod openai;

pub use openai::OpenAiEmbedder;

/// Deterministic hashing embedder for tests and offline development.
pub struct FakeEmbedder { dim: usize, id: String }

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim, id: format!("fake:xxhash:d{dim}") } }
}

impl Embedder for FakeEmbedder {
    fn id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        use std::hash::{Hash, Hasher}; use twox_hash::XxHash64;
        if self.dim == 0 { return Err(Error::Embedding("fake embedder has zero dimensions".to_string())); }
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() { let mut hasher = XxHash64::with_seed(0); token.to_lowercase().hash(&mut hasher); let h = hasher.finish(); let idx = usize::try_from(h % self.dim as u64).unwrap_or(0); let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32); v[idx] += val + (i as f32 % 3.0) * 0.01; }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6); for x in &mut v { *x /= norm; } Ok(v)
    }
}

/// Dimensions used by the fake embedder when none are configured.
pub const FAKE_DIM: usize = 64;

fn fake_forced() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// Build the embedder selected by `settings`.
///
/// `APP_USE_FAKE_EMBEDDINGS=1` forces the fake embedder regardless of the
/// configured provider.
pub fn embedder_from_settings(settings: &EmbeddingSettings) -> Result<Box<dyn Embedder>> {
    let dim = settings.dimensions.unwrap_or(FAKE_DIM);
    if fake_forced() || settings.provider == EmbeddingProviderKind::Fake {
        info!(dim, "using fake embedder");
        return Ok(Box::new(FakeEmbedder::new(dim)));
    }
    let provider = OpenAiEmbedder::new(settings)?;
    info!(id = provider.id(), "using OpenAI-compatible embedder");
    Ok(Box::new(provider))
}
