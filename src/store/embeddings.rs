use crate::types::Result;

/// Dense text embedding backend used by the reference store
///
/// Embedding is synchronous. The store embeds a document only after a lookup
/// misses, and never while holding its lock.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    fn model_name(&self) -> &str;
}

#[cfg(feature = "local-embeddings")]
pub use local::FastEmbedder;

#[cfg(feature = "local-embeddings")]
mod local {
    use super::Embedder;
    use crate::types::{AppError, Result};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use parking_lot::Mutex;

    /// Local ONNX embeddings (BAAI/bge-small-en-v1.5)
    pub struct FastEmbedder {
        model: Mutex<TextEmbedding>,
    }

    impl FastEmbedder {
        pub fn new() -> Result<Self> {
            let model = TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::BGESmallENV15).with_show_download_progress(true),
            )
            .map_err(|e| AppError::Internal(e.to_string()))?;

            Ok(Self {
                model: Mutex::new(model),
            })
        }
    }

    impl Embedder for FastEmbedder {
        fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.model
                .lock()
                .embed(texts.to_vec(), None)
                .map_err(|e| AppError::Internal(e.to_string()))
        }

        fn model_name(&self) -> &str {
            "BAAI/bge-small-en-v1.5"
        }
    }
}
