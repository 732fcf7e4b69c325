//! Single-image prediction.

use std::cmp::Ordering;
use std::path::Path;

use anyhow::{Context, Result};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::load_image_array;
use crate::labels::LabelRegistry;
use crate::model::LeafClassifier;
use crate::{CHANNELS, IMAGE_SIZE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub label_index: usize,
    pub label_name: String,
    pub confidence: f32,
    pub probabilities: Vec<f32>,
}

/// Argmax over a probability distribution, decoded through the registry.
pub fn decode_prediction(probabilities: &[f32], registry: &LabelRegistry) -> Result<Prediction> {
    let (label_index, confidence) = probabilities
        .iter()
        .copied()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal))
        .context("empty probability distribution")?;

    let label_name = registry
        .name_at(label_index)
        .with_context(|| format!("distribution index {label_index} outside the label registry"))?
        .to_string();

    Ok(Prediction {
        label_index,
        label_name,
        confidence,
        probabilities: probabilities.to_vec(),
    })
}

/// Predict the condition of one image file.
///
/// The image goes through the dataset loader's own preprocessing before the
/// batch dimension is added; using any other transform here would skew
/// accuracy without ever raising an error. Unlike dataset scanning, a
/// missing or unreadable file is a hard error.
pub fn predict_image<B: Backend>(
    model: &LeafClassifier<B>,
    path: &Path,
    registry: &LabelRegistry,
    device: &B::Device,
) -> Result<Prediction> {
    let pixels = load_image_array(path)?;

    let data: Vec<f32> = pixels.iter().copied().collect();
    let input = Tensor::<B, 1>::from_floats(
        TensorData::new(data, [CHANNELS * IMAGE_SIZE * IMAGE_SIZE]),
        device,
    )
    .reshape([1, CHANNELS, IMAGE_SIZE, IMAGE_SIZE]);

    let probabilities: Vec<f32> = model
        .forward_softmax(input)
        .into_data()
        .to_vec()
        .map_err(|err| anyhow::anyhow!("failed to read probabilities: {err:?}"))?;

    decode_prediction(&probabilities, registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> LabelRegistry {
        LabelRegistry::new([
            "Healthy",
            "PowderyMildew",
            "BacterialBlight",
            "NitrogenDeficiency",
            "PotassiumDeficiency",
        ])
        .unwrap()
    }

    #[test]
    fn decode_picks_the_most_probable_label() {
        let prediction = decode_prediction(&[0.1, 0.6, 0.1, 0.1, 0.1], &registry()).unwrap();

        assert_eq!(prediction.label_index, 1);
        assert_eq!(prediction.label_name, "PowderyMildew");
        assert!((prediction.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn decode_rejects_distribution_wider_than_registry() {
        let result = decode_prediction(&[0.0, 0.0, 0.0, 0.0, 0.0, 1.0], &registry());
        assert!(result.is_err());
    }

    #[test]
    fn decode_rejects_empty_distribution() {
        assert!(decode_prediction(&[], &registry()).is_err());
    }
}
