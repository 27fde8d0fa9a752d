//! Text classifiers: inference → argmax → label table.
//!
//! The category and sentiment classifiers share this shape but hold
//! separate models and tables. Neither holds mutable state.

use std::sync::Arc;

use tracing::debug;

use crate::error::{ClassifierError, InferenceError};
use crate::inference::{InferenceRuntime, ModelHandle};
use crate::pipeline::labels::{Category, Label, LabelTable, Sentiment};
use crate::pipeline::normalize::prepare;

pub type CategoryClassifier = Classifier<Category>;
pub type SentimentClassifier = Classifier<Sentiment>;

/// Raw model output reduced to its winning class.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    pub scores: Vec<f32>,
}

impl Prediction {
    /// Pick the highest-scoring class; ties go to the lowest index.
    /// Returns `None` when no score is comparable (empty or all NaN).
    pub fn from_scores(scores: Vec<f32>) -> Option<Self> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &score) in scores.iter().enumerate() {
            if score.is_nan() {
                continue;
            }
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((i, score)),
            }
        }
        best.map(|(class_index, _)| Self {
            class_index,
            scores,
        })
    }
}

/// A sequence classifier producing labels of type `L`.
pub struct Classifier<L: Label> {
    model: ModelHandle,
    labels: LabelTable<L>,
    runtime: Arc<dyn InferenceRuntime>,
}

impl<L: Label> Classifier<L> {
    pub fn new(model: ModelHandle, labels: LabelTable<L>, runtime: Arc<dyn InferenceRuntime>) -> Self {
        Self {
            model,
            labels,
            runtime,
        }
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    /// Classify `text`.
    ///
    /// An index outside the label table is a `LabelMapping` fault, never a
    /// guessed label.
    pub async fn classify(&self, text: &str) -> Result<L, ClassifierError> {
        let prediction = self.predict(text).await?;
        let label = self
            .labels
            .get(prediction.class_index)
            .ok_or_else(|| ClassifierError::LabelMapping {
                classifier: L::KIND.to_string(),
                index: prediction.class_index,
                table_len: self.labels.len(),
            })?;
        debug!(
            classifier = L::KIND,
            index = prediction.class_index,
            label = %label,
            "Classified text"
        );
        Ok(label)
    }

    /// Run the model and reduce its scores to a prediction.
    pub async fn predict(&self, text: &str) -> Result<Prediction, ClassifierError> {
        let scores = self.runtime.scores(&self.model, &prepare(text)).await?;
        Prediction::from_scores(scores).ok_or_else(|| {
            ClassifierError::Inference(InferenceError::InvalidResponse {
                model: self.model.to_string(),
                reason: "model returned no usable class scores".into(),
            })
        })
    }
}
