//! Dataset loading for directory-per-class leaf image trees.
//!
//! A split root looks like:
//!
//! ```text
//! root/
//! ├── Healthy/
//! │   ├── img_001.jpg
//! │   └── img_002.jpg
//! ├── PowderyMildew/
//! │   └── ...
//! └── ...
//! ```
//!
//! Class subdirectories are visited in [`LabelRegistry`] order so that the
//! subdirectory position never influences the label encoding. Missing class
//! directories and unreadable files shrink the split instead of failing it;
//! both are recorded in the [`LoadReport`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::labels::LabelRegistry;
use crate::{CHANNELS, IMAGE_SIZE};

/// One decoded image with its label code.
///
/// Pixels are planar [C, H, W] with planes stored R, G, B regardless of the
/// decoder's native pixel order, values scaled to [0, 1].
#[derive(Debug, Clone)]
pub struct LeafSample {
    pub pixels: Array3<f32>,
    pub label: usize,
}

/// Why a directory entry produced no sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SkipReason {
    NotAFile,
    Undecodable(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotAFile => write!(f, "not a regular file"),
            SkipReason::Undecodable(err) => write!(f, "undecodable: {err}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Per-scan outcome record: which classes had no directory and which files
/// were skipped. Consumers assert on these instead of parsing log output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadReport {
    pub missing_classes: Vec<String>,
    pub skipped: Vec<SkippedFile>,
}

/// An in-memory split: index-aligned samples plus the scan report.
#[derive(Debug, Clone)]
pub struct LeafDataset {
    samples: Vec<LeafSample>,
    report: LoadReport,
}

impl LeafDataset {
    /// Scan `root` for one subdirectory per registry label and decode every
    /// file found there. Never fails: a missing class directory or an
    /// unreadable file is logged, recorded and skipped.
    pub fn load<P: AsRef<Path>>(root: P, registry: &LabelRegistry) -> Self {
        let root = root.as_ref();
        info!("loading dataset from {}", root.display());

        let mut samples = Vec::new();
        let mut report = LoadReport::default();

        for (label, name) in registry.names().enumerate() {
            let class_dir = root.join(name);

            let entries = match fs::read_dir(&class_dir) {
                Ok(entries) => entries,
                Err(_) => {
                    warn!(
                        "no class directory for {name:?}, split has no samples for it: {}",
                        class_dir.display()
                    );
                    report.missing_classes.push(name.to_string());
                    continue;
                }
            };

            let mut paths: Vec<PathBuf> = entries.flatten().map(|entry| entry.path()).collect();
            paths.sort();

            let before = samples.len();
            for path in paths {
                if !path.is_file() {
                    report.skipped.push(SkippedFile {
                        path,
                        reason: SkipReason::NotAFile,
                    });
                    continue;
                }

                match load_image_array(&path) {
                    Ok(pixels) => samples.push(LeafSample { pixels, label }),
                    Err(err) => {
                        warn!("skipping {}: {err:#}", path.display());
                        report.skipped.push(SkippedFile {
                            path,
                            reason: SkipReason::Undecodable(format!("{err:#}")),
                        });
                    }
                }
            }

            info!(
                "class {name:?} (label {label}): {} samples",
                samples.len() - before
            );
        }

        info!(
            "loaded {} samples, {} skipped, {} missing class directories",
            samples.len(),
            report.skipped.len(),
            report.missing_classes.len()
        );

        Self { samples, report }
    }

    pub fn from_samples(samples: Vec<LeafSample>) -> Self {
        Self {
            samples,
            report: LoadReport::default(),
        }
    }

    pub fn samples(&self) -> &[LeafSample] {
        &self.samples
    }

    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|sample| sample.label).collect()
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Dataset<LeafSample> for LeafDataset {
    fn get(&self, index: usize) -> Option<LeafSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Decode and preprocess one image file.
pub fn load_image_array(path: &Path) -> Result<Array3<f32>> {
    let image = ImageReader::open(path)
        .with_context(|| format!("failed to open image {}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode image {}", path.display()))?;

    Ok(image_to_array(&image))
}

/// The one preprocessing transform: resize to the fixed geometry, then
/// convert the decoder's interleaved pixels to planar [C, H, W] with planes
/// in R, G, B order and components scaled to [0, 1]. Every image entering
/// the model, whether from a split or the single inference file, must pass
/// through here.
pub fn image_to_array(image: &DynamicImage) -> Array3<f32> {
    let resized = image.resize_exact(IMAGE_SIZE as u32, IMAGE_SIZE as u32, FilterType::Triangle);
    let rgb = resized.to_rgb8();

    let mut pixels = Array3::<f32>::zeros((CHANNELS, IMAGE_SIZE, IMAGE_SIZE));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        pixels[[0, y as usize, x as usize]] = r as f32 / 255.0;
        pixels[[1, y as usize, x as usize]] = g as f32 / 255.0;
        pixels[[2, y as usize, x as usize]] = b as f32 / 255.0;
    }

    pixels
}

#[derive(Clone, Debug)]
pub struct LeafBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

#[derive(Clone, Debug)]
pub struct LeafBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> LeafBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<LeafSample, LeafBatch<B>> for LeafBatcher<B> {
    fn batch(&self, items: Vec<LeafSample>) -> LeafBatch<B> {
        let batch_size = items.len();

        let mut images_data = Vec::with_capacity(batch_size * CHANNELS * IMAGE_SIZE * IMAGE_SIZE);
        for item in &items {
            images_data.extend(item.pixels.iter().copied());
        }

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, CHANNELS, IMAGE_SIZE, IMAGE_SIZE]),
            &self.device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets_data, [batch_size]),
            &self.device,
        );

        LeafBatch { images, targets }
    }
}
