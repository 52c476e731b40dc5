//! Tomato Leaf Classifier
//!
//! MobileNetV2 backbone followed by a small classification head:
//! global average pooling, a ReLU hidden layer, dropout and the output layer.
//! `forward` returns logits (the loss applies softmax); `forward_softmax`
//! returns class probabilities for inference.

use burn::{
    config::Config,
    module::Module,
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::mobilenet::{MobileNetV2, FEATURE_CHANNELS};

/// Configuration for the TomatoClassifier model
#[derive(Config, Debug)]
pub struct TomatoClassifierConfig {
    /// Number of output classes
    #[config(default = "5")]
    pub num_classes: usize,

    /// Units in the hidden dense layer of the head
    #[config(default = "128")]
    pub hidden_units: usize,

    /// Dropout rate applied after the hidden layer
    #[config(default = "0.5")]
    pub dropout: f64,
}

impl TomatoClassifierConfig {
    /// Initialize a classifier with a randomly initialised backbone
    pub fn init<B: Backend>(&self, device: &B::Device) -> TomatoClassifier<B> {
        self.init_with_backbone(MobileNetV2::new(device), device)
    }

    /// Initialize a classifier around an existing (e.g. pretrained) backbone
    pub fn init_with_backbone<B: Backend>(
        &self,
        backbone: MobileNetV2<B>,
        device: &B::Device,
    ) -> TomatoClassifier<B> {
        TomatoClassifier {
            backbone,
            head: ClassificationHead::new(self, device),
            num_classes: self.num_classes,
        }
    }
}

/// Classification head on top of the backbone feature map
#[derive(Module, Debug)]
pub struct ClassificationHead<B: Backend> {
    pub pool: AdaptiveAvgPool2d,
    pub hidden: Linear<B>,
    pub relu: Relu,
    pub dropout: Dropout,
    pub output: Linear<B>,
}

impl<B: Backend> ClassificationHead<B> {
    pub fn new(config: &TomatoClassifierConfig, device: &B::Device) -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            hidden: LinearConfig::new(FEATURE_CHANNELS, config.hidden_units).init(device),
            relu: Relu::new(),
            dropout: DropoutConfig::new(config.dropout).init(),
            output: LinearConfig::new(config.hidden_units, config.num_classes).init(device),
        }
    }

    /// `[batch, 1280, h, w]` feature map -> `[batch, num_classes]` logits
    pub fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        // Global pooling: [B, C, H, W] -> [B, C, 1, 1]
        let x = self.pool.forward(features);

        // Flatten: [B, C, 1, 1] -> [B, C]
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.relu.forward(self.hidden.forward(x));
        let x = self.dropout.forward(x);
        self.output.forward(x)
    }
}

/// Tomato leaf disease classifier
#[derive(Module, Debug)]
pub struct TomatoClassifier<B: Backend> {
    pub backbone: MobileNetV2<B>,
    pub head: ClassificationHead<B>,
    num_classes: usize,
}

impl<B: Backend> TomatoClassifier<B> {
    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width] with values in [0, 1]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward(self.backbone.forward(x))
    }

    /// Forward pass with softmax for inference
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let logits = self.forward(x);
        burn::tensor::activation::softmax(logits, 1)
    }

    /// Get the number of output classes
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}
