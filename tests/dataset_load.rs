use std::fs;
use std::path::Path;

use burn::data::dataloader::batcher::Batcher;
use burn_ndarray::NdArray;
use image::{Rgb, RgbImage};

use leafnet::data::{load_image_array, LeafBatcher, LeafDataset, SkipReason};
use leafnet::inference::predict_image;
use leafnet::labels::LabelRegistry;
use leafnet::model::LeafClassifierConfig;
use leafnet::{CHANNELS, IMAGE_SIZE};

type TestBackend = NdArray<f32>;

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

fn write_image(path: &Path, rgb: [u8; 3]) {
    RgbImage::from_pixel(64, 64, Rgb(rgb)).save(path).unwrap();
}

#[test]
fn partial_class_layout_loads_without_failing() {
    let temp = tempfile::tempdir().unwrap();
    let healthy = temp.path().join("Healthy");
    let mildew = temp.path().join("PowderyMildew");
    fs::create_dir_all(&healthy).unwrap();
    fs::create_dir_all(&mildew).unwrap();

    write_image(&healthy.join("leaf_a.png"), [40, 180, 60]);
    write_image(&healthy.join("leaf_b.png"), [60, 160, 70]);
    write_image(&mildew.join("leaf_c.png"), [200, 200, 190]);

    let registry = registry();
    let dataset = LeafDataset::load(temp.path(), &registry);

    assert_eq!(dataset.samples().len(), 3);
    assert_eq!(dataset.labels(), vec![0, 0, 1]);
    assert_eq!(
        dataset.report().missing_classes,
        vec![
            "BacterialBlight".to_string(),
            "NitrogenDeficiency".to_string(),
            "PotassiumDeficiency".to_string(),
        ]
    );
    assert!(dataset.report().skipped.is_empty());

    for sample in dataset.samples() {
        assert_eq!(sample.pixels.dim(), (CHANNELS, IMAGE_SIZE, IMAGE_SIZE));
        assert!(sample.pixels.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert!(sample.label < registry.len());
    }
}

#[test]
fn corrupt_file_shrinks_the_class_not_the_run() {
    let temp = tempfile::tempdir().unwrap();
    let healthy = temp.path().join("Healthy");
    fs::create_dir_all(&healthy).unwrap();

    write_image(&healthy.join("leaf_a.png"), [40, 180, 60]);
    write_image(&healthy.join("leaf_b.png"), [60, 160, 70]);
    write_image(&healthy.join("leaf_c.png"), [80, 140, 80]);
    fs::write(healthy.join("broken.jpg"), b"this is not an image").unwrap();

    let dataset = LeafDataset::load(temp.path(), &registry());

    assert_eq!(dataset.samples().len(), 3);
    assert_eq!(dataset.report().skipped.len(), 1);
    assert!(matches!(
        dataset.report().skipped[0].reason,
        SkipReason::Undecodable(_)
    ));
}

#[test]
fn nested_directories_are_recorded_not_decoded() {
    let temp = tempfile::tempdir().unwrap();
    let healthy = temp.path().join("Healthy");
    fs::create_dir_all(healthy.join("thumbnails")).unwrap();
    write_image(&healthy.join("leaf_a.png"), [40, 180, 60]);

    let dataset = LeafDataset::load(temp.path(), &registry());

    assert_eq!(dataset.samples().len(), 1);
    assert_eq!(dataset.report().skipped.len(), 1);
    assert!(matches!(
        dataset.report().skipped[0].reason,
        SkipReason::NotAFile
    ));
}

#[test]
fn channel_order_survives_the_file_round_trip() {
    let temp = tempfile::tempdir().unwrap();
    let red_path = temp.path().join("red.png");
    let blue_path = temp.path().join("blue.png");
    write_image(&red_path, [255, 0, 0]);
    write_image(&blue_path, [0, 0, 255]);

    let red = load_image_array(&red_path).unwrap();
    assert!(red[[0, 100, 100]] > 0.9);
    assert!(red[[2, 100, 100]] < 0.05);

    let blue = load_image_array(&blue_path).unwrap();
    assert!(blue[[0, 100, 100]] < 0.05);
    assert!(blue[[2, 100, 100]] > 0.9);
}

#[test]
fn loaded_batch_feeds_the_cpu_backend() {
    let temp = tempfile::tempdir().unwrap();
    let healthy = temp.path().join("Healthy");
    let mildew = temp.path().join("PowderyMildew");
    fs::create_dir_all(&healthy).unwrap();
    fs::create_dir_all(&mildew).unwrap();
    write_image(&healthy.join("leaf_a.png"), [40, 180, 60]);
    write_image(&healthy.join("leaf_b.png"), [60, 160, 70]);
    write_image(&mildew.join("leaf_c.png"), [200, 200, 190]);

    let dataset = LeafDataset::load(temp.path(), &registry());

    let device = Default::default();
    let batcher = LeafBatcher::<TestBackend>::new(device);
    let batch = batcher.batch(dataset.samples().to_vec());

    assert_eq!(batch.images.dims(), [3, CHANNELS, IMAGE_SIZE, IMAGE_SIZE]);
    assert_eq!(batch.targets.dims(), [3]);

    let targets: Vec<i64> = batch.targets.into_data().to_vec().unwrap();
    assert_eq!(targets, vec![0, 0, 1]);
}

#[test]
fn single_image_prediction_decodes_through_the_registry() {
    let temp = tempfile::tempdir().unwrap();
    let leaf_path = temp.path().join("leaf.png");
    write_image(&leaf_path, [50, 170, 60]);

    let registry = registry();
    let device = Default::default();
    let model = LeafClassifierConfig::new(registry.len()).init::<TestBackend>(&device);

    let prediction = predict_image(&model, &leaf_path, &registry, &device).unwrap();

    assert!(prediction.label_index < registry.len());
    assert_eq!(
        registry.name_at(prediction.label_index),
        Some(prediction.label_name.as_str())
    );
    assert_eq!(prediction.probabilities.len(), registry.len());
    let total: f32 = prediction.probabilities.iter().sum();
    assert!((total - 1.0).abs() < 1e-4);
}

#[test]
fn missing_inference_image_is_a_hard_error() {
    let temp = tempfile::tempdir().unwrap();
    assert!(load_image_array(&temp.path().join("no_such_leaf.jpg")).is_err());
}
