use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use burn::{
    config::Config,
    data::dataloader::batcher::Batcher,
    data::dataloader::DataLoaderBuilder,
    data::dataset::Dataset,
    module::Module,
    optim::AdamConfig,
    record::CompactRecorder,
    tensor::backend::{AutodiffBackend, Backend},
    tensor::ElementConversion,
    train::{
        metric::{AccuracyMetric, LossMetric},
        LearnerBuilder,
    },
};
use tracing::info;

use crate::augment::AugmentedDataset;
use crate::data::{LeafBatcher, LeafDataset};
use crate::model::{LeafClassifier, LeafClassifierConfig};

#[derive(Config)]
pub struct TrainingConfig {
    pub model: LeafClassifierConfig,

    pub optimizer: AdamConfig,

    #[config(default = 10)]
    pub epoch_count: usize,

    #[config(default = 32)]
    pub batch_size: usize,

    #[config(default = 42)]
    pub seed: u64,

    #[config(default = 1.0e-3)]
    pub learning_rate: f64,

    #[config(default = 4)]
    pub worker_count: usize,
}

fn create_artifact_dir(artifact_dir: &Path) -> Result<()> {
    fs::remove_dir_all(artifact_dir).ok();
    fs::create_dir_all(artifact_dir)
        .with_context(|| format!("failed to create artifact dir {}", artifact_dir.display()))
}

/// Train over the augmented stream, monitoring the validation split each
/// epoch. Persists the config and the trained weights under `artifact_dir`
/// and returns the trained model.
pub fn train<B: AutodiffBackend>(
    artifact_dir: &Path,
    config: &TrainingConfig,
    train_data: AugmentedDataset,
    valid_data: LeafDataset,
    device: B::Device,
) -> Result<LeafClassifier<B>> {
    create_artifact_dir(artifact_dir)?;

    config
        .save(artifact_dir.join("config.json"))
        .context("failed to persist training config")?;

    B::seed(config.seed);

    info!(
        "training on {} samples, validating on {}",
        train_data.len(),
        valid_data.len()
    );

    let batcher_train = LeafBatcher::<B>::new(device.clone());
    let batcher_valid = LeafBatcher::<B::InnerBackend>::new(device.clone());

    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.worker_count)
        .build(train_data);

    let dataloader_valid = DataLoaderBuilder::new(batcher_valid)
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.worker_count)
        .build(valid_data);

    let learner = LearnerBuilder::new(artifact_dir)
        .metric_train_numeric(AccuracyMetric::new())
        .metric_valid_numeric(AccuracyMetric::new())
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .with_file_checkpointer(CompactRecorder::new())
        .devices(vec![device.clone()])
        .num_epochs(config.epoch_count)
        .summary()
        .build(
            config.model.init::<B>(&device),
            config.optimizer.init(),
            config.learning_rate,
        );

    let model_trained = learner.fit(dataloader_train, dataloader_valid);

    model_trained
        .clone()
        .save_file(artifact_dir.join("model"), &CompactRecorder::new())
        .map_err(|err| anyhow::anyhow!("failed to save trained model: {err:?}"))?;

    Ok(model_trained)
}

/// Mean cross-entropy loss and accuracy over a held-out split.
pub fn evaluate<B: Backend>(
    model: &LeafClassifier<B>,
    dataset: &LeafDataset,
    batch_size: usize,
    device: &B::Device,
) -> (f64, f64) {
    let batcher = LeafBatcher::<B>::new(device.clone());
    let len = dataset.len();

    let mut total_loss = 0.0f64;
    let mut correct = 0usize;

    for start in (0..len).step_by(batch_size.max(1)) {
        let end = (start + batch_size).min(len);
        let items: Vec<_> = (start..end).filter_map(|i| dataset.get(i)).collect();
        if items.is_empty() {
            continue;
        }
        let count = items.len();

        let batch = batcher.batch(items);
        let output = model.forward_classification(batch.images, batch.targets.clone());

        let loss: f64 = output.loss.into_scalar().elem();
        total_loss += loss * count as f64;

        let predictions = output.output.argmax(1).squeeze::<1>(1);
        let batch_correct: i64 = predictions
            .equal(batch.targets)
            .int()
            .sum()
            .into_scalar()
            .elem();
        correct += batch_correct as usize;
    }

    if len == 0 {
        return (0.0, 0.0);
    }

    (total_loss / len as f64, correct as f64 / len as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::LeafSample;
    use crate::{CHANNELS, IMAGE_SIZE};
    use burn_ndarray::NdArray;
    use ndarray::Array3;

    type TestBackend = NdArray<f32>;

    #[test]
    fn evaluate_reports_loss_and_accuracy() {
        let device = Default::default();
        let model = LeafClassifierConfig::new(2).init::<TestBackend>(&device);

        let samples = vec![
            LeafSample {
                pixels: Array3::from_elem((CHANNELS, IMAGE_SIZE, IMAGE_SIZE), 0.25),
                label: 0,
            },
            LeafSample {
                pixels: Array3::from_elem((CHANNELS, IMAGE_SIZE, IMAGE_SIZE), 0.75),
                label: 1,
            },
        ];
        let dataset = LeafDataset::from_samples(samples);

        let (loss, accuracy) = evaluate(&model, &dataset, 2, &device);

        assert!(loss.is_finite());
        assert!((0.0..=1.0).contains(&accuracy));
    }

    #[test]
    fn evaluate_on_empty_split_is_zero() {
        let device = Default::default();
        let model = LeafClassifierConfig::new(2).init::<TestBackend>(&device);
        let dataset = LeafDataset::from_samples(Vec::new());

        assert_eq!(evaluate(&model, &dataset, 8, &device), (0.0, 0.0));
    }
}
