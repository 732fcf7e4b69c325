//! Training-time augmentation.
//!
//! The policy is fixed configuration, not learned: random rotation, shift,
//! shear, zoom and horizontal flip, with out-of-bounds samples clamped to
//! the nearest edge pixel. [`AugmentedDataset`] exposes the randomized view
//! through Burn's `Dataset` trait, so the data loader draws fresh transforms
//! every epoch instead of iterating the raw finite split.

use burn::config::Config;
use burn::data::dataset::Dataset;
use ndarray::{Array3, Axis};
use rand::{thread_rng, Rng};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::warn;

use crate::data::{LeafDataset, LeafSample};
use crate::{CHANNELS, IMAGE_SIZE};

#[derive(Config, Debug)]
pub struct AugmentConfig {
    /// Rotation sampled uniformly in +/- this many degrees.
    #[config(default = 40.0)]
    pub rotation_degrees: f64,

    /// Horizontal translation as a fraction of the image width.
    #[config(default = 0.2)]
    pub width_shift: f64,

    /// Vertical translation as a fraction of the image height.
    #[config(default = 0.2)]
    pub height_shift: f64,

    /// Horizontal shear coefficient, sampled in +/- this value.
    #[config(default = 0.2)]
    pub shear: f64,

    /// Zoom factor sampled in [1 - zoom, 1 + zoom], shared by both axes.
    #[config(default = 0.2)]
    pub zoom: f64,

    #[config(default = true)]
    pub horizontal_flip: bool,

    /// Subtract the fitted per-channel mean. Off by default; requires `fit`.
    #[config(default = false)]
    pub featurewise_center: bool,

    /// Divide by the fitted per-channel deviation. Off by default.
    #[config(default = false)]
    pub featurewise_normalize: bool,
}

/// Per-channel statistics over a training split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStats {
    pub mean: [f32; CHANNELS],
    pub std: [f32; CHANNELS],
}

pub struct Augmenter {
    config: AugmentConfig,
    stats: Option<ChannelStats>,
}

impl Augmenter {
    pub fn new(config: AugmentConfig) -> Self {
        Self {
            config,
            stats: None,
        }
    }

    /// Compute per-channel mean and deviation over the given split. Only the
    /// feature-wise transforms consume these, but fitting is cheap and keeps
    /// the statistics available if those transforms are switched on.
    pub fn fit(&mut self, dataset: &LeafDataset) {
        let samples = dataset.samples();
        if samples.is_empty() {
            warn!("fitting augmentation statistics on an empty split");
            self.stats = None;
            return;
        }

        let (sum, sum_sq) = samples
            .par_iter()
            .map(|sample| {
                let mut sum = [0.0f64; CHANNELS];
                let mut sum_sq = [0.0f64; CHANNELS];
                for channel in 0..CHANNELS {
                    for &value in sample.pixels.index_axis(Axis(0), channel).iter() {
                        let value = value as f64;
                        sum[channel] += value;
                        sum_sq[channel] += value * value;
                    }
                }
                (sum, sum_sq)
            })
            .reduce(
                || ([0.0; CHANNELS], [0.0; CHANNELS]),
                |(mut sum_a, mut sq_a), (sum_b, sq_b)| {
                    for channel in 0..CHANNELS {
                        sum_a[channel] += sum_b[channel];
                        sq_a[channel] += sq_b[channel];
                    }
                    (sum_a, sq_a)
                },
            );

        let count = (samples.len() * IMAGE_SIZE * IMAGE_SIZE) as f64;
        let mut mean = [0.0f32; CHANNELS];
        let mut std = [0.0f32; CHANNELS];
        for channel in 0..CHANNELS {
            let channel_mean = sum[channel] / count;
            mean[channel] = channel_mean as f32;
            std[channel] = (sum_sq[channel] / count - channel_mean * channel_mean)
                .max(0.0)
                .sqrt() as f32;
        }

        self.stats = Some(ChannelStats { mean, std });
    }

    pub fn stats(&self) -> Option<&ChannelStats> {
        self.stats.as_ref()
    }

    pub fn transform_sample(&self, sample: LeafSample) -> LeafSample {
        LeafSample {
            pixels: self.apply(&sample.pixels),
            label: sample.label,
        }
    }

    /// Apply one freshly drawn random transform.
    pub fn apply(&self, pixels: &Array3<f32>) -> Array3<f32> {
        self.apply_with(pixels, &mut thread_rng())
    }

    fn apply_with<R: Rng>(&self, pixels: &Array3<f32>, rng: &mut R) -> Array3<f32> {
        let cfg = &self.config;

        let theta = rng
            .gen_range(-cfg.rotation_degrees..=cfg.rotation_degrees)
            .to_radians();
        let shear = rng.gen_range(-cfg.shear..=cfg.shear);
        let zoom = rng.gen_range(1.0 - cfg.zoom..=1.0 + cfg.zoom);
        let shift_x = rng.gen_range(-cfg.width_shift..=cfg.width_shift) * IMAGE_SIZE as f64;
        let shift_y = rng.gen_range(-cfg.height_shift..=cfg.height_shift) * IMAGE_SIZE as f64;
        let flip = cfg.horizontal_flip && rng.gen_bool(0.5);

        // Forward map is rotation * shear * zoom about the image center,
        // then translation. Sampling runs the inverse per output pixel.
        let (sin, cos) = theta.sin_cos();
        let m00 = cos * zoom;
        let m01 = (cos * shear - sin) * zoom;
        let m10 = sin * zoom;
        let m11 = (sin * shear + cos) * zoom;
        let det = m00 * m11 - m01 * m10;
        let inv00 = m11 / det;
        let inv01 = -m01 / det;
        let inv10 = -m10 / det;
        let inv11 = m00 / det;

        let center = (IMAGE_SIZE as f64 - 1.0) / 2.0;
        let edge = (IMAGE_SIZE - 1) as f64;

        let mut out = Array3::<f32>::zeros((CHANNELS, IMAGE_SIZE, IMAGE_SIZE));
        for y in 0..IMAGE_SIZE {
            for x in 0..IMAGE_SIZE {
                let dx = x as f64 - center - shift_x;
                let dy = y as f64 - center - shift_y;

                // Nearest-neighbor source pixel, clamped for edge fill.
                let src_x = (inv00 * dx + inv01 * dy + center).round().clamp(0.0, edge) as usize;
                let src_y = (inv10 * dx + inv11 * dy + center).round().clamp(0.0, edge) as usize;
                let src_x = if flip { IMAGE_SIZE - 1 - src_x } else { src_x };

                for channel in 0..CHANNELS {
                    out[[channel, y, x]] = pixels[[channel, src_y, src_x]];
                }
            }
        }

        if cfg.featurewise_center || cfg.featurewise_normalize {
            if let Some(stats) = &self.stats {
                for channel in 0..CHANNELS {
                    let mean = if cfg.featurewise_center {
                        stats.mean[channel]
                    } else {
                        0.0
                    };
                    let std = if cfg.featurewise_normalize {
                        stats.std[channel].max(f32::EPSILON)
                    } else {
                        1.0
                    };
                    out.index_axis_mut(Axis(0), channel)
                        .mapv_inplace(|v| (v - mean) / std);
                }
            } else {
                warn!("feature-wise transform requested without fitted statistics");
            }
        }

        out
    }
}

/// Randomized view over a split: every `get` re-draws the transform, so the
/// stream of batches never repeats across epochs and restarts cleanly.
pub struct AugmentedDataset {
    inner: LeafDataset,
    augmenter: Augmenter,
}

impl AugmentedDataset {
    pub fn new(inner: LeafDataset, augmenter: Augmenter) -> Self {
        Self { inner, augmenter }
    }
}

impl Dataset<LeafSample> for AugmentedDataset {
    fn get(&self, index: usize) -> Option<LeafSample> {
        self.inner
            .get(index)
            .map(|sample| self.augmenter.transform_sample(sample))
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
