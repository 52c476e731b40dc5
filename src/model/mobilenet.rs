//! MobileNetV2 Backbone
//!
//! Feature extractor used for transfer learning. The network is organised in
//! stages (stem, 17 inverted-residual blocks, final 1x1 convolution) so that a
//! prefix of stages can run frozen while the remaining stages are trained.
//!
//! For a 224x224 input the output feature map is `[batch, 1280, 7, 7]`.

use std::ops::Range;
use std::path::Path;

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    record::CompactRecorder,
    tensor::{backend::Backend, Tensor},
};

use super::artifact::weights_path;
use crate::utils::error::{Result, TomatoError};

/// Channels of the final feature map
pub const FEATURE_CHANNELS: usize = 1280;

/// Inverted residual settings: (expansion t, output channels c, repeats n, first stride s)
const BLOCK_SETTINGS: [(usize, usize, usize, usize); 7] = [
    (1, 16, 1, 1),
    (6, 24, 2, 2),
    (6, 32, 3, 2),
    (6, 64, 4, 2),
    (6, 96, 3, 1),
    (6, 160, 3, 2),
    (6, 320, 1, 1),
];

const STEM_CHANNELS: usize = 32;

/// Keras layers of the stem: input, convolution, batch norm, ReLU6
const STEM_LAYERS: usize = 4;

/// Keras layers of the final stage: convolution, batch norm, ReLU6
const LAST_LAYERS: usize = 3;

/// ReLU clipped at 6
fn relu6<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    x.clamp(0.0, 6.0)
}

/// Convolution + BatchNorm + ReLU6
#[derive(Module, Debug)]
pub struct ConvBnAct<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
}

impl<B: Backend> ConvBnAct<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        groups: usize,
        device: &B::Device,
    ) -> Self {
        let padding = kernel_size / 2;
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_groups(groups)
            .with_bias(false)
            .init(device);

        Self {
            conv,
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu6(self.bn.forward(self.conv.forward(x)))
    }
}

/// Inverted residual block: optional 1x1 expansion, 3x3 depthwise, linear 1x1 projection
#[derive(Module, Debug)]
pub struct InvertedResidual<B: Backend> {
    pub expand: Option<ConvBnAct<B>>,
    pub depthwise: ConvBnAct<B>,
    pub project: Conv2d<B>,
    pub project_bn: BatchNorm<B>,
    stride: usize,
    use_residual: bool,
}

impl<B: Backend> InvertedResidual<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        expansion: usize,
        device: &B::Device,
    ) -> Self {
        let hidden = in_channels * expansion;

        let expand = if expansion != 1 {
            Some(ConvBnAct::new(in_channels, hidden, 1, 1, 1, device))
        } else {
            None
        };

        let depthwise = ConvBnAct::new(hidden, hidden, 3, stride, hidden, device);

        let project = Conv2dConfig::new([hidden, out_channels], [1, 1])
            .with_bias(false)
            .init(device);

        Self {
            expand,
            depthwise,
            project,
            project_bn: BatchNormConfig::new(out_channels).init(device),
            stride,
            use_residual: stride == 1 && in_channels == out_channels,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = match &self.expand {
            Some(expand) => expand.forward(x.clone()),
            None => x.clone(),
        };
        let out = self.depthwise.forward(out);
        let out = self.project_bn.forward(self.project.forward(out));

        if self.use_residual {
            out + x
        } else {
            out
        }
    }

    /// Layers of this block in the Keras MobileNetV2 layer list
    ///
    /// Counts convolutions, batch norms and activations, plus the zero
    /// padding of strided blocks and the residual add.
    pub fn num_layers(&self) -> usize {
        match self.expand {
            None => 5,
            Some(_) => 8 + usize::from(self.stride == 2) + usize::from(self.use_residual),
        }
    }
}

/// MobileNetV2 feature extractor (width multiplier 1.0, no classifier)
#[derive(Module, Debug)]
pub struct MobileNetV2<B: Backend> {
    pub stem: ConvBnAct<B>,
    pub blocks: Vec<InvertedResidual<B>>,
    pub last: ConvBnAct<B>,
}

impl<B: Backend> MobileNetV2<B> {
    /// Create a randomly initialised backbone
    pub fn new(device: &B::Device) -> Self {
        let stem = ConvBnAct::new(3, STEM_CHANNELS, 3, 2, 1, device);

        let mut blocks = Vec::new();
        let mut in_channels = STEM_CHANNELS;
        for (expansion, out_channels, repeats, first_stride) in BLOCK_SETTINGS {
            for i in 0..repeats {
                let stride = if i == 0 { first_stride } else { 1 };
                blocks.push(InvertedResidual::new(
                    in_channels,
                    out_channels,
                    stride,
                    expansion,
                    device,
                ));
                in_channels = out_channels;
            }
        }

        let last = ConvBnAct::new(in_channels, FEATURE_CHANNELS, 1, 1, 1, device);

        Self { stem, blocks, last }
    }

    /// Number of stages: stem, each block, final convolution
    pub fn num_stages(&self) -> usize {
        self.blocks.len() + 2
    }

    /// Run a single stage
    pub fn forward_stage(&self, stage: usize, x: Tensor<B, 4>) -> Tensor<B, 4> {
        if stage == 0 {
            self.stem.forward(x)
        } else if stage <= self.blocks.len() {
            self.blocks[stage - 1].forward(x)
        } else {
            self.last.forward(x)
        }
    }

    /// Run a contiguous range of stages
    pub fn forward_range(&self, x: Tensor<B, 4>, stages: Range<usize>) -> Tensor<B, 4> {
        let end = stages.end.min(self.num_stages());
        (stages.start..end).fold(x, |x, stage| self.forward_stage(stage, x))
    }

    /// Full forward pass: `[batch, 3, H, W]` -> `[batch, 1280, H/32, W/32]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.forward_range(x, 0..self.num_stages())
    }

    /// Keras layer count of each stage, in stage order
    pub fn stage_layers(&self) -> Vec<usize> {
        let mut layers = Vec::with_capacity(self.num_stages());
        layers.push(STEM_LAYERS);
        layers.extend(self.blocks.iter().map(InvertedResidual::num_layers));
        layers.push(LAST_LAYERS);
        layers
    }

    /// Total layers of the Keras layer list (154, input layer included)
    pub fn num_layers(&self) -> usize {
        self.stage_layers().iter().sum()
    }

    /// First stage that must be trainable so that the last `last_layers`
    /// layers are trainable.
    ///
    /// Stages before the returned index stay frozen. Returns `num_stages()`
    /// when nothing is trainable and 0 when everything is.
    pub fn trainable_from(&self, last_layers: usize) -> usize {
        let layers = self.stage_layers();
        let total: usize = layers.iter().sum();
        if last_layers == 0 {
            return layers.len();
        }
        let cutoff = total.saturating_sub(last_layers);

        let mut end = 0;
        for (stage, count) in layers.iter().enumerate() {
            end += count;
            if end > cutoff {
                return stage;
            }
        }
        layers.len()
    }

    /// Load backbone parameters from a burn record file
    pub fn load_weights<P: AsRef<Path>>(self, path: P, device: &B::Device) -> Result<Self> {
        let path = weights_path(path.as_ref());
        if !path.exists() {
            return Err(TomatoError::ModelNotFound(path));
        }

        self.load_file(path.clone(), &CompactRecorder::new(), device)
            .map_err(|e| {
                TomatoError::Model(format!("Failed to load backbone weights {:?}: {}", path, e))
            })
    }

    /// Save backbone parameters to a burn record file
    pub fn save_weights<P: AsRef<Path>>(self, path: P) -> Result<()> {
        self.save_file(weights_path(path.as_ref()), &CompactRecorder::new())
            .map_err(|e| TomatoError::Model(format!("Failed to save backbone weights: {}", e)))
    }
}
