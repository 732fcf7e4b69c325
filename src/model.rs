//! Fixed-topology CNN classifier.
//!
//! Three valid-padding 3x3 convolution stages (32, 64, 128 channels), each
//! followed by ReLU and 2x2 max-pooling, then a flattened 128-wide dense
//! layer with dropout and a class-sized head. Only the class count and the
//! dropout rate are configurable; the topology is not.

use burn::{
    prelude::*,
    tensor::{activation::softmax, backend::AutodiffBackend},
    train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep},
};
use nn::{
    conv::{Conv2d, Conv2dConfig},
    loss::CrossEntropyLossConfig,
    pool::{MaxPool2d, MaxPool2dConfig},
    Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
};

use crate::data::LeafBatch;
use crate::{CHANNELS, IMAGE_SIZE};

/// Spatial size after one stage: valid 3x3 convolution, then 2x2 pooling
/// with stride 2.
const fn stage_output(size: usize) -> usize {
    (size - 4) / 2 + 1
}

/// 224 -> 111 -> 54 -> 26 for the fixed input geometry.
const FEATURE_SIDE: usize = stage_output(stage_output(stage_output(IMAGE_SIZE)));

#[derive(Config, Debug)]
pub struct LeafClassifierConfig {
    pub num_classes: usize,

    #[config(default = 0.5)]
    pub dropout: f64,
}

impl LeafClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LeafClassifier<B> {
        let conv = |channels: [usize; 2]| {
            Conv2dConfig::new(channels, [3, 3])
                .with_padding(PaddingConfig2d::Valid)
                .init(device)
        };
        let pool = || MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        LeafClassifier {
            conv1: conv([CHANNELS, 32]),
            pool1: pool(),
            conv2: conv([32, 64]),
            pool2: pool(),
            conv3: conv([64, 128]),
            pool3: pool(),
            activation: Relu::new(),
            fc1: LinearConfig::new(128 * FEATURE_SIDE * FEATURE_SIDE, 128).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc2: LinearConfig::new(128, self.num_classes).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct LeafClassifier<B: Backend> {
    conv1: Conv2d<B>,
    pool1: MaxPool2d,
    conv2: Conv2d<B>,
    pool2: MaxPool2d,
    conv3: Conv2d<B>,
    pool3: MaxPool2d,
    activation: Relu,
    fc1: Linear<B>,
    dropout: Dropout,
    fc2: Linear<B>,
}

impl<B: Backend> LeafClassifier<B> {
    /// Logits of shape [batch, num_classes].
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool1.forward(self.activation.forward(self.conv1.forward(x)));
        let x = self.pool2.forward(self.activation.forward(self.conv2.forward(x)));
        let x = self.pool3.forward(self.activation.forward(self.conv3.forward(x)));

        let x = x.flatten(1, 3);

        let x = self.activation.forward(self.fc1.forward(x));
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    /// Probability distribution over the registry, for inference.
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    /// Loss over integer class codes. Targets are sparse label indices, not
    /// one-hot vectors.
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);

        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

impl<B: AutodiffBackend> TrainStep<LeafBatch<B>, ClassificationOutput<B>> for LeafClassifier<B> {
    fn step(&self, batch: LeafBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);

        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<LeafBatch<B>, ClassificationOutput<B>> for LeafClassifier<B> {
    fn step(&self, batch: LeafBatch<B>) -> ClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}
