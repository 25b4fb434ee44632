use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::prelude::*;

use super::rebnconv::ReBnConv;
use super::upsample::upsample_like;

/// Residual U-block, parameterized by depth (7 down to 4 in the full
/// network). The input conv lifts to `out` channels, the internal U runs at
/// `mid` channels with 2x2 pooling on the way down and bilinear upsampling
/// on the way up, and the block output is the decoder result plus the
/// lifted input.
#[derive(Module, Debug)]
pub struct Rsu<B: Backend> {
    conv_in: ReBnConv<B>,
    enc: Vec<ReBnConv<B>>,
    bottom: ReBnConv<B>,
    dec: Vec<ReBnConv<B>>,
    pool: MaxPool2d,
}

impl<B: Backend> Rsu<B> {
    pub fn new(
        device: &B::Device,
        depth: usize,
        in_channels: usize,
        mid_channels: usize,
        out_channels: usize,
    ) -> Self {
        assert!(depth >= 2, "RSU depth must be at least 2, got {}", depth);

        let mut enc = Vec::with_capacity(depth - 1);
        enc.push(ReBnConv::new(device, out_channels, mid_channels, 1));
        for _ in 1..depth - 1 {
            enc.push(ReBnConv::new(device, mid_channels, mid_channels, 1));
        }

        let mut dec = Vec::with_capacity(depth - 1);
        for _ in 1..depth - 1 {
            dec.push(ReBnConv::new(device, mid_channels * 2, mid_channels, 1));
        }
        dec.push(ReBnConv::new(device, mid_channels * 2, out_channels, 1));

        Self {
            conv_in: ReBnConv::new(device, in_channels, out_channels, 1),
            enc,
            bottom: ReBnConv::new(device, mid_channels, mid_channels, 2),
            dec,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let hxin = self.conv_in.forward(x);

        // Encoder: pool between stages, not after the deepest one.
        let mut skips = Vec::with_capacity(self.enc.len());
        let mut hx = hxin.clone();
        for (i, conv) in self.enc.iter().enumerate() {
            hx = conv.forward(hx);
            skips.push(hx.clone());
            if i + 1 < self.enc.len() {
                hx = self.pool.forward(hx);
            }
        }

        // Dilated bottom conv at the deepest resolution.
        let mut hx = self.bottom.forward(skips[skips.len() - 1].clone());

        // Decoder: concat with the matching skip, upsampling to its size.
        for (i, conv) in self.dec.iter().enumerate() {
            let skip = &skips[skips.len() - 1 - i];
            if i > 0 {
                hx = upsample_like(hx, skip);
            }
            hx = conv.forward(Tensor::cat(vec![hx, skip.clone()], 1));
        }

        hx + hxin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn rsu_preserves_spatial_size() {
        let device = Default::default();
        let block = Rsu::<TestBackend>::new(&device, 7, 3, 4, 8);
        let x = Tensor::zeros([1, 3, 32, 32], &device);
        assert_eq!(block.forward(x).dims(), [1, 8, 32, 32]);
    }

    #[test]
    fn shallow_rsu_handles_small_inputs() {
        let device = Default::default();
        let block = Rsu::<TestBackend>::new(&device, 4, 8, 4, 8);
        let x = Tensor::zeros([2, 8, 9, 9], &device);
        assert_eq!(block.forward(x).dims(), [2, 8, 9, 9]);
    }
}
