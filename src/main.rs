use std::path::Path;

use anyhow::Result;
use burn::{
    backend::{wgpu::WgpuDevice, Autodiff, Wgpu},
    module::AutodiffModule,
    optim::AdamConfig,
};
use tracing::{info, Level};

use leafnet::augment::{AugmentConfig, AugmentedDataset, Augmenter};
use leafnet::data::LeafDataset;
use leafnet::inference::predict_image;
use leafnet::labels::LabelRegistry;
use leafnet::model::LeafClassifierConfig;
use leafnet::training::{evaluate, train, TrainingConfig};

const LABELS: [&str; 5] = [
    "Healthy",
    "PowderyMildew",
    "BacterialBlight",
    "NitrogenDeficiency",
    "PotassiumDeficiency",
];

const TRAIN_DIR: &str = "./train";
const VAL_DIR: &str = "./val";
const TEST_DIR: &str = "./test";
const INFERENCE_IMAGE: &str = "./healthy42.jpg";

fn main() -> Result<()> {
    type Backend = Wgpu<f32, i32>;
    type AutodiffBackend = Autodiff<Backend>;

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let registry = LabelRegistry::new(LABELS)?;
    let device = WgpuDevice::default();
    let artifact_dir = Path::new("artifact");

    let train_split = LeafDataset::load(TRAIN_DIR, &registry);
    let val_split = LeafDataset::load(VAL_DIR, &registry);
    let test_split = LeafDataset::load(TEST_DIR, &registry);

    let mut augmenter = Augmenter::new(AugmentConfig::new());
    augmenter.fit(&train_split);

    let config = TrainingConfig::new(LeafClassifierConfig::new(registry.len()), AdamConfig::new());
    let model = train::<AutodiffBackend>(
        artifact_dir,
        &config,
        AugmentedDataset::new(train_split, augmenter),
        val_split,
        device.clone(),
    )?;

    let model = model.valid();
    let (test_loss, test_accuracy) = evaluate(&model, &test_split, config.batch_size, &device);
    info!("test loss: {test_loss:.4}");
    println!("Test accuracy: {test_accuracy}");

    let prediction = predict_image(&model, Path::new(INFERENCE_IMAGE), &registry, &device)?;
    println!("Predicted class: {}", prediction.label_name);

    Ok(())
}
