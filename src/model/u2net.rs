use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;
use burn::tensor::activation::sigmoid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::blocks::{upsample_like, Rsu, Rsu4F};

/// Input and output planes are both RGB in this pipeline: the masks are
/// stored as 3-channel images.
pub const CHANNELS: usize = 3;

/// Closed set of supported architectures. The full network and the small
/// ("P") one share the topology and differ only in channel widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    U2Net,
    U2NetP,
}

impl ModelVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVariant::U2Net => "u2net",
            ModelVariant::U2NetP => "u2netp",
        }
    }

    pub fn build<B: Backend>(&self, device: &B::Device) -> U2Net<B> {
        U2Net::new(device, *self)
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "u2net" => Ok(ModelVariant::U2Net),
            "u2netp" => Ok(ModelVariant::U2NetP),
            other => Err(format!(
                "unknown architecture '{}', expected 'u2net' or 'u2netp'",
                other
            )),
        }
    }
}

/// Two-level nested U: six RSU encoder stages, five RSU decoder stages,
/// a 3x3 side conv per decoder level plus the deepest encoder, and a 1x1
/// fusion conv over the concatenated side maps. `forward` returns the
/// seven sigmoid maps `[d0..d6]`, all at input resolution; `d0` is the
/// fused primary output.
#[derive(Module, Debug)]
pub struct U2Net<B: Backend> {
    stage1: Rsu<B>,
    stage2: Rsu<B>,
    stage3: Rsu<B>,
    stage4: Rsu<B>,
    stage5: Rsu4F<B>,
    stage6: Rsu4F<B>,

    stage5d: Rsu4F<B>,
    stage4d: Rsu<B>,
    stage3d: Rsu<B>,
    stage2d: Rsu<B>,
    stage1d: Rsu<B>,

    side1: Conv2d<B>,
    side2: Conv2d<B>,
    side3: Conv2d<B>,
    side4: Conv2d<B>,
    side5: Conv2d<B>,
    side6: Conv2d<B>,
    outconv: Conv2d<B>,

    pool: MaxPool2d,
}

fn side_conv<B: Backend>(device: &B::Device, in_channels: usize) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, CHANNELS], [3, 3])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device)
}

impl<B: Backend> U2Net<B> {
    pub fn new(device: &B::Device, variant: ModelVariant) -> Self {
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        match variant {
            ModelVariant::U2Net => Self {
                stage1: Rsu::new(device, 7, CHANNELS, 32, 64),
                stage2: Rsu::new(device, 6, 64, 32, 128),
                stage3: Rsu::new(device, 5, 128, 64, 256),
                stage4: Rsu::new(device, 4, 256, 128, 512),
                stage5: Rsu4F::new(device, 512, 256, 512),
                stage6: Rsu4F::new(device, 512, 256, 512),

                stage5d: Rsu4F::new(device, 1024, 256, 512),
                stage4d: Rsu::new(device, 4, 1024, 128, 256),
                stage3d: Rsu::new(device, 5, 512, 64, 128),
                stage2d: Rsu::new(device, 6, 256, 32, 64),
                stage1d: Rsu::new(device, 7, 128, 16, 64),

                side1: side_conv(device, 64),
                side2: side_conv(device, 64),
                side3: side_conv(device, 128),
                side4: side_conv(device, 256),
                side5: side_conv(device, 512),
                side6: side_conv(device, 512),
                outconv: Conv2dConfig::new([6 * CHANNELS, CHANNELS], [1, 1]).init(device),

                pool,
            },
            ModelVariant::U2NetP => Self {
                stage1: Rsu::new(device, 7, CHANNELS, 16, 64),
                stage2: Rsu::new(device, 6, 64, 16, 64),
                stage3: Rsu::new(device, 5, 64, 16, 64),
                stage4: Rsu::new(device, 4, 64, 16, 64),
                stage5: Rsu4F::new(device, 64, 16, 64),
                stage6: Rsu4F::new(device, 64, 16, 64),

                stage5d: Rsu4F::new(device, 128, 16, 64),
                stage4d: Rsu::new(device, 4, 128, 16, 64),
                stage3d: Rsu::new(device, 5, 128, 16, 64),
                stage2d: Rsu::new(device, 6, 128, 16, 64),
                stage1d: Rsu::new(device, 7, 128, 16, 64),

                side1: side_conv(device, 64),
                side2: side_conv(device, 64),
                side3: side_conv(device, 64),
                side4: side_conv(device, 64),
                side5: side_conv(device, 64),
                side6: side_conv(device, 64),
                outconv: Conv2dConfig::new([6 * CHANNELS, CHANNELS], [1, 1]).init(device),

                pool,
            },
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> [Tensor<B, 4>; 7] {
        // Encoder.
        let hx1 = self.stage1.forward(x);
        let hx = self.pool.forward(hx1.clone());
        let hx2 = self.stage2.forward(hx);
        let hx = self.pool.forward(hx2.clone());
        let hx3 = self.stage3.forward(hx);
        let hx = self.pool.forward(hx3.clone());
        let hx4 = self.stage4.forward(hx);
        let hx = self.pool.forward(hx4.clone());
        let hx5 = self.stage5.forward(hx);
        let hx = self.pool.forward(hx5.clone());
        let hx6 = self.stage6.forward(hx);

        // Decoder.
        let hx6up = upsample_like(hx6.clone(), &hx5);
        let hx5d = self.stage5d.forward(Tensor::cat(vec![hx6up, hx5], 1));
        let hx5dup = upsample_like(hx5d.clone(), &hx4);
        let hx4d = self.stage4d.forward(Tensor::cat(vec![hx5dup, hx4], 1));
        let hx4dup = upsample_like(hx4d.clone(), &hx3);
        let hx3d = self.stage3d.forward(Tensor::cat(vec![hx4dup, hx3], 1));
        let hx3dup = upsample_like(hx3d.clone(), &hx2);
        let hx2d = self.stage2d.forward(Tensor::cat(vec![hx3dup, hx2], 1));
        let hx2dup = upsample_like(hx2d.clone(), &hx1);
        let hx1d = self.stage1d.forward(Tensor::cat(vec![hx2dup, hx1], 1));

        // Side outputs, all brought to input resolution.
        let d1 = self.side1.forward(hx1d);
        let d2 = upsample_like(self.side2.forward(hx2d), &d1);
        let d3 = upsample_like(self.side3.forward(hx3d), &d1);
        let d4 = upsample_like(self.side4.forward(hx4d), &d1);
        let d5 = upsample_like(self.side5.forward(hx5d), &d1);
        let d6 = upsample_like(self.side6.forward(hx6), &d1);

        let d0 = self.outconv.forward(Tensor::cat(
            vec![
                d1.clone(),
                d2.clone(),
                d3.clone(),
                d4.clone(),
                d5.clone(),
                d6.clone(),
            ],
            1,
        ));

        [
            sigmoid(d0),
            sigmoid(d1),
            sigmoid(d2),
            sigmoid(d3),
            sigmoid(d4),
            sigmoid(d5),
            sigmoid(d6),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn variant_parses_from_cli_strings() {
        assert_eq!("u2net".parse::<ModelVariant>().unwrap(), ModelVariant::U2Net);
        assert_eq!(
            "u2netp".parse::<ModelVariant>().unwrap(),
            ModelVariant::U2NetP
        );
        assert!("resnet".parse::<ModelVariant>().is_err());
    }

    #[test]
    fn u2netp_forward_yields_seven_maps_at_input_resolution() {
        let device = Default::default();
        let model = ModelVariant::U2NetP.build::<TestBackend>(&device);
        let x = Tensor::zeros([1, 3, 32, 32], &device);
        let outputs = model.forward(x);
        assert_eq!(outputs.len(), 7);
        for d in &outputs {
            assert_eq!(d.dims(), [1, 3, 32, 32]);
        }
    }

    #[test]
    fn outputs_are_sigmoid_bounded() {
        let device = Default::default();
        let model = ModelVariant::U2NetP.build::<TestBackend>(&device);
        let x = Tensor::random(
            [1, 3, 32, 32],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let [d0, ..] = model.forward(x);
        let data = d0.into_data();
        for v in data.iter::<f32>() {
            assert!((0.0..=1.0).contains(&v));
        }
    }
}
