//! Local ONNX Runtime embedding provider.
//!
//! Runs sentence-transformers all-MiniLM-L6-v2 through `ort`: tokenize, run the
//! encoder, mean-pool token states under the attention mask, L2-normalize.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{EmbeddingProvider, MINILM_DIM};
use crate::config::EmbeddingConfig;
use crate::vector::l2_normalize;

/// Maximum sequence length for all-MiniLM-L6-v2 (trained at 256).
const MAX_SEQ_LEN: usize = 256;

pub const MODEL_FILE: &str = "model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

const HF_ORG: &str = "sentence-transformers";

/// Paths of the model and tokenizer, one directory per configured model.
pub fn model_paths(config: &EmbeddingConfig) -> (PathBuf, PathBuf) {
    let dir = crate::config::expand_tilde(&config.cache_dir).join(&config.model);
    (dir.join(MODEL_FILE), dir.join(TOKENIZER_FILE))
}

/// Hugging Face download URLs for `model`'s ONNX export and tokenizer.
///
/// The model must be a `sentence-transformers` repo with 384-dimensional output.
pub fn model_urls(model: &str) -> (String, String) {
    let base = format!("https://huggingface.co/{HF_ORG}/{model}/resolve/main");
    (
        format!("{base}/onnx/{MODEL_FILE}"),
        format!("{base}/{TOKENIZER_FILE}"),
    )
}

/// Sentence embedder backed by an ONNX session.
pub struct LocalEmbeddingProvider {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    model: String,
}

impl LocalEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_path, tokenizer_path) = model_paths(config);

        anyhow::ensure!(
            !config.model.is_empty() && !config.model.contains(['/', '\\']) && config.model != "..",
            "invalid embedding.model {:?}: expected a sentence-transformers model name",
            config.model
        );
        anyhow::ensure!(
            model_path.exists(),
            "ONNX model not found at {}. Run `sounding model download` first.",
            model_path.display()
        );
        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer not found at {}. Run `sounding model download` first.",
            tokenizer_path.display()
        );

        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&model_path)
            .context("failed to load ONNX model")?;
        tracing::info!(model = %model_path.display(), "ONNX model loaded");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            model: config.model.clone(),
        })
    }
}

/// Average the token states of one sequence, weighting by attention mask.
///
/// `states` is the `[seq_len, hidden]` slice for a single batch row.
fn mean_pool(states: &[f32], mask: &[i64], hidden: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden];
    let mut count = 0.0f32;
    for (token, &m) in states.chunks_exact(hidden).zip(mask) {
        if m > 0 {
            for (acc, x) in sum.iter_mut().zip(token) {
                *acc += x;
            }
            count += 1.0;
        }
    }
    if count > 0.0 {
        for acc in &mut sum {
            *acc /= count;
        }
    }
    sum
}

impl EmbeddingProvider for LocalEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .context("ONNX session returned no rows")
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;

        let batch = encodings.len();
        let seq_len = encodings[0].get_ids().len();

        let ids: Vec<i64> = encodings
            .iter()
            .flat_map(|e| e.get_ids().iter().map(|&id| id as i64))
            .collect();
        let mask: Vec<i64> = encodings
            .iter()
            .flat_map(|e| e.get_attention_mask().iter().map(|&m| m as i64))
            .collect();
        // Single-segment input: token types are all zero.
        let token_types = vec![0i64; batch * seq_len];

        let shape = vec![batch as i64, seq_len as i64];
        let ids_tensor = Tensor::from_array((shape.clone(), ids.into_boxed_slice()))?;
        let mask_tensor = Tensor::from_array((shape.clone(), mask.clone().into_boxed_slice()))?;
        let types_tensor = Tensor::from_array((shape, token_types.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("session lock poisoned: {e}"))?;

        let outputs = session.run(ort::inputs! {
            "input_ids" => ids_tensor,
            "attention_mask" => mask_tensor,
            "token_type_ids" => types_tensor,
        })?;

        // Output naming differs between exports.
        let states = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);

        let (dims, data) = states
            .try_extract_tensor::<f32>()
            .context("failed to extract token state tensor")?;
        let dims: &[i64] = &dims;
        anyhow::ensure!(
            dims.len() == 3 && dims[2] == MINILM_DIM as i64,
            "unexpected token state shape {dims:?}, expected [batch, seq, {MINILM_DIM}]"
        );
        let out_seq = dims[1] as usize;
        let hidden = dims[2] as usize;

        let rows = (0..batch)
            .map(|b| {
                let states = &data[b * out_seq * hidden..(b + 1) * out_seq * hidden];
                let row_mask = &mask[b * seq_len..b * seq_len + out_seq.min(seq_len)];
                l2_normalize(&mean_pool(states, row_mask, hidden))
            })
            .collect();
        Ok(rows)
    }

    fn dimensions(&self) -> usize {
        MINILM_DIM
    }

    fn version(&self) -> String {
        format!("local:{}", self.model)
    }
}
