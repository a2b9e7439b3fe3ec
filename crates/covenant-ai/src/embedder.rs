//! ONNX Runtime sentence embeddings.
//!
//! Wraps a sentence-transformers export (all-MiniLM-L6-v2 by default,
//! 384 dimensions) for clause and feedback embedding. The model directory
//! must hold `model.onnx` and `tokenizer.json`. Output vectors are
//! mean-pooled over the attention mask and L2-normalised, so dot products
//! are cosine similarities.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::info;

use covenant_core::{PortError, TextEncoder};

/// Sequence cap for MiniLM-family models.
const MAX_TOKENS: usize = 256;

/// Blocking ONNX embedding pipeline.
pub struct SentenceEmbedder {
    session: Session,
    tokenizer: Tokenizer,
    dim: usize,
}

/// Token tensors for one batch, flattened to `[batch, seq]` row-major.
struct TokenBatch {
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
    token_type_ids: Vec<i64>,
    batch: usize,
    seq: usize,
}

impl SentenceEmbedder {
    /// Load a model directory containing `model.onnx` and `tokenizer.json`.
    pub fn load(model_dir: &Path) -> anyhow::Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        anyhow::ensure!(
            model_path.exists(),
            "model.onnx not found in {model_dir:?}"
        );
        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {model_dir:?}"
        );

        let session = Session::builder()?.commit_from_file(&model_path)?;
        let dim = output_dim(&session).unwrap_or(384);

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("configure truncation: {e}"))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams::default()));

        info!(dim, model = %model_path.display(), "loaded sentence embedder");
        Ok(Self {
            session,
            tokenizer,
            dim,
        })
    }

    /// Embedding dimensionality.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Embed one text.
    pub fn embed(&mut self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text])?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedding batch came back empty"))
    }

    /// Embed a batch of texts, one unit-length vector per input.
    pub fn embed_batch(&mut self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let tokens = self.tokenize(texts)?;
        let shape = [tokens.batch as i64, tokens.seq as i64];

        let ids_tensor = Tensor::from_array((shape, tokens.input_ids.into_boxed_slice()))?;
        let mask_tensor =
            Tensor::from_array((shape, tokens.attention_mask.clone().into_boxed_slice()))?;
        let type_tensor = Tensor::from_array((shape, tokens.token_type_ids.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs![
            "input_ids" => ids_tensor,
            "attention_mask" => mask_tensor,
            "token_type_ids" => type_tensor,
        ])?;

        let (out_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: &[i64] = out_shape;
        anyhow::ensure!(
            dims.len() == 3
                && dims[0] as usize == tokens.batch
                && dims[2] as usize == self.dim,
            "unexpected model output shape {dims:?}"
        );
        let out_seq = dims[1] as usize;

        Ok(mean_pool(
            data,
            &tokens.attention_mask,
            tokens.batch,
            tokens.seq,
            out_seq,
            self.dim,
        ))
    }

    fn tokenize(&self, texts: &[&str]) -> anyhow::Result<TokenBatch> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;
        let seq = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);
        let batch = texts.len();

        let mut input_ids = vec![0i64; batch * seq];
        let mut attention_mask = vec![0i64; batch * seq];
        let mut token_type_ids = vec![0i64; batch * seq];
        for (row, encoding) in encodings.iter().enumerate() {
            let base = row * seq;
            for (col, &id) in encoding.get_ids().iter().enumerate() {
                input_ids[base + col] = i64::from(id);
            }
            for (col, &mask) in encoding.get_attention_mask().iter().enumerate() {
                attention_mask[base + col] = i64::from(mask);
            }
            for (col, &kind) in encoding.get_type_ids().iter().enumerate() {
                token_type_ids[base + col] = i64::from(kind);
            }
        }

        Ok(TokenBatch {
            input_ids,
            attention_mask,
            token_type_ids,
            batch,
            seq,
        })
    }
}

/// Mean-pool token embeddings over the attention mask, then normalise.
fn mean_pool(
    data: &[f32],
    attention_mask: &[i64],
    batch: usize,
    mask_seq: usize,
    out_seq: usize,
    dim: usize,
) -> Vec<Vec<f32>> {
    let mut vectors = Vec::with_capacity(batch);
    for row in 0..batch {
        let mut pooled = vec![0.0f32; dim];
        let mut count = 0.0f32;
        for col in 0..out_seq {
            if attention_mask[row * mask_seq + col] == 0 {
                continue;
            }
            let base = (row * out_seq + col) * dim;
            for (target, &value) in pooled.iter_mut().zip(&data[base..base + dim]) {
                *target += value;
            }
            count += 1.0;
        }
        if count > 0.0 {
            for value in &mut pooled {
                *value /= count;
            }
        }
        crate::disposition::normalize(&mut pooled);
        vectors.push(pooled);
    }
    vectors
}

fn output_dim(session: &Session) -> Option<usize> {
    match session.outputs().first()?.dtype() {
        ort::value::ValueType::Tensor { shape, .. } => shape
            .last()
            .and_then(|&d| usize::try_from(d).ok())
            .filter(|&d| d > 0),
        _ => None,
    }
}

/// [`TextEncoder`] adapter over the blocking embedder.
///
/// Inference holds an internal lock for its duration; callers already
/// budget for multi-second model latency.
pub struct OnnxEncoder {
    inner: Mutex<SentenceEmbedder>,
    dim: usize,
}

impl OnnxEncoder {
    pub fn load(model_dir: &Path) -> anyhow::Result<Self> {
        let embedder = SentenceEmbedder::load(model_dir)?;
        let dim = embedder.dim();
        Ok(Self {
            inner: Mutex::new(embedder),
            dim,
        })
    }
}

#[async_trait]
impl TextEncoder for OnnxEncoder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>, PortError> {
        let mut embedder = self
            .inner
            .lock()
            .map_err(|_| PortError::fatal("embedder lock poisoned"))?;
        embedder
            .embed(text)
            .map_err(|e| PortError::fatal(format!("embedding failed: {e}")))
    }
}
