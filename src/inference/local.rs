//! Local inference runtime: DistilBERT sequence classifiers run with Candle.
//!
//! Each model directory holds `config.json`, `tokenizer.json` and
//! `model.safetensors` exported from a `DistilBertForSequenceClassification`
//! checkpoint. All models are loaded once at startup and never mutated.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use candle_core::{DType, Device, IndexOp, Module, Tensor};
use candle_nn::{Linear, VarBuilder, linear};
use candle_transformers::models::distilbert::{Config as DistilBertConfig, DistilBertModel};
use serde::Deserialize;
use tokenizers::Tokenizer;

use super::{InferenceRuntime, ModelHandle};
use crate::error::InferenceError;

/// Tokens kept per input; DistilBERT's position embedding limit.
const MAX_SEQ_LEN: usize = 512;

/// Fields of `config.json` needed to size the classification head.
#[derive(Debug, Deserialize)]
struct HeadConfig {
    dim: usize,
    #[serde(default)]
    id2label: HashMap<String, String>,
    #[serde(default)]
    num_labels: Option<usize>,
}

impl HeadConfig {
    fn num_labels(&self) -> Option<usize> {
        self.num_labels.or_else(|| {
            if self.id2label.is_empty() {
                None
            } else {
                Some(self.id2label.len())
            }
        })
    }
}

/// One loaded classifier: encoder + `pre_classifier` + `classifier` head.
struct SequenceClassifier {
    tokenizer: Tokenizer,
    encoder: DistilBertModel,
    pre_classifier: Linear,
    classifier: Linear,
    device: Device,
}

impl SequenceClassifier {
    fn load(dir: &Path) -> Result<Self, String> {
        let device = Device::Cpu;

        let config_raw = std::fs::read_to_string(dir.join("config.json"))
            .map_err(|e| format!("config.json: {e}"))?;
        let config: DistilBertConfig =
            serde_json::from_str(&config_raw).map_err(|e| format!("config.json: {e}"))?;
        let head: HeadConfig =
            serde_json::from_str(&config_raw).map_err(|e| format!("config.json: {e}"))?;
        let num_labels = head
            .num_labels()
            .ok_or_else(|| "config.json declares neither num_labels nor id2label".to_string())?;

        let mut tokenizer = Tokenizer::from_file(dir.join("tokenizer.json"))
            .map_err(|e| format!("tokenizer.json: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| format!("tokenizer truncation: {e}"))?;

        let weights = dir.join("model.safetensors");
        // SAFETY: the weights file is memory-mapped read-only and is not
        // modified while the process runs.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device) }
            .map_err(|e| format!("model.safetensors: {e}"))?;

        let encoder = DistilBertModel::load(vb.pp("distilbert"), &config)
            .map_err(|e| format!("encoder weights: {e}"))?;
        let pre_classifier = linear(head.dim, head.dim, vb.pp("pre_classifier"))
            .map_err(|e| format!("pre_classifier weights: {e}"))?;
        let classifier = linear(head.dim, num_labels, vb.pp("classifier"))
            .map_err(|e| format!("classifier weights: {e}"))?;

        Ok(Self {
            tokenizer,
            encoder,
            pre_classifier,
            classifier,
            device,
        })
    }

    fn logits(&self, text: &str) -> Result<Vec<f32>, String> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| format!("tokenize: {e}"))?;
        let ids = encoding.get_ids();
        let seq_len = ids.len();

        let input_ids = Tensor::new(ids, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(|e| e.to_string())?;
        // Single unpadded sequence: nothing is masked.
        let mask = Tensor::zeros((seq_len, seq_len), DType::U8, &self.device)
            .map_err(|e| e.to_string())?;

        let hidden = self
            .encoder
            .forward(&input_ids, &mask)
            .map_err(|e| e.to_string())?;
        let cls = hidden.i((.., 0)).map_err(|e| e.to_string())?;
        let pooled = self
            .pre_classifier
            .forward(&cls)
            .and_then(|t| t.relu())
            .map_err(|e| e.to_string())?;
        let logits = self
            .classifier
            .forward(&pooled)
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| e.to_string())?;

        Ok(logits)
    }
}

/// In-process runtime keyed by model handle.
pub struct LocalRuntime {
    models: HashMap<ModelHandle, Arc<SequenceClassifier>>,
}

impl LocalRuntime {
    /// Load every model directory named by `handles`.
    pub fn load(handles: &[&ModelHandle]) -> Result<Self, InferenceError> {
        let mut models = HashMap::new();
        for handle in handles {
            if models.contains_key(*handle) {
                continue;
            }
            let model = SequenceClassifier::load(Path::new(handle.as_str())).map_err(|reason| {
                InferenceError::LoadFailed {
                    model: handle.to_string(),
                    reason,
                }
            })?;
            tracing::info!(model = %handle, "Loaded local classification model");
            models.insert((*handle).clone(), Arc::new(model));
        }
        Ok(Self { models })
    }
}

#[async_trait]
impl InferenceRuntime for LocalRuntime {
    fn name(&self) -> &str {
        "local"
    }

    async fn scores(&self, model: &ModelHandle, text: &str) -> Result<Vec<f32>, InferenceError> {
        let classifier = self
            .models
            .get(model)
            .map(Arc::clone)
            .ok_or_else(|| InferenceError::ModelNotLoaded {
                model: model.to_string(),
            })?;
        let text = text.to_string();
        run_blocking(model, move || classifier.logits(&text)).await
    }
}

/// Run CPU-bound model work on the blocking pool so request handlers and
/// `/health` keep being served while a forward pass runs.
async fn run_blocking<T, F>(model: &ModelHandle, work: F) -> Result<T, InferenceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, String> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| InferenceError::Unavailable {
            model: model.to_string(),
            reason: format!("inference task failed: {e}"),
        })?
        .map_err(|reason| InferenceError::Unavailable {
            model: model.to_string(),
            reason,
        })
}
