use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation;

/// 3x3 conv + batch norm + ReLU, the elementary block of every RSU stage.
/// Padding equals the dilation so spatial size is preserved.
#[derive(Module, Debug)]
pub struct ReBnConv<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> ReBnConv<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        dilation: usize,
    ) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(dilation, dilation))
                .with_dilation([dilation, dilation])
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        activation::relu(x)
    }
}
