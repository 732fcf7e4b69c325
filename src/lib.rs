//! Leaf condition classification with the Burn framework.
//!
//! The pipeline is a fixed sequence of independent stages: load the three
//! splits from directory-per-class trees, fit augmentation statistics on
//! the train split, train the CNN over the augmented stream, evaluate on
//! the test split, then predict one held-out image.
//!
//! - `labels`: the ordered class-name registry defining the label encoding
//! - `data`: filesystem loader, in-memory datasets and batching
//! - `augment`: randomized training-time transforms
//! - `model`: the fixed-topology CNN
//! - `training`: learner wiring and test-split evaluation
//! - `inference`: single-image prediction

pub mod augment;
pub mod data;
pub mod inference;
pub mod labels;
pub mod model;
pub mod training;

pub use data::{LeafBatch, LeafBatcher, LeafDataset, LeafSample};
pub use labels::LabelRegistry;
pub use model::{LeafClassifier, LeafClassifierConfig};

/// Fixed square geometry of every image entering the model.
pub const IMAGE_SIZE: usize = 224;

/// RGB channel count.
pub const CHANNELS: usize = 3;
