use burn::prelude::*;

use super::rebnconv::ReBnConv;

/// The fully-dilated RSU variant used at the deepest stages: dilations
/// 1/2/4 down, 8 at the bottom, 4/2/1 up. No pooling, no upsampling, so it
/// works at resolutions where further halving would degenerate.
#[derive(Module, Debug)]
pub struct Rsu4F<B: Backend> {
    conv_in: ReBnConv<B>,
    enc1: ReBnConv<B>,
    enc2: ReBnConv<B>,
    enc3: ReBnConv<B>,
    bottom: ReBnConv<B>,
    dec3: ReBnConv<B>,
    dec2: ReBnConv<B>,
    dec1: ReBnConv<B>,
}

impl<B: Backend> Rsu4F<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        mid_channels: usize,
        out_channels: usize,
    ) -> Self {
        Self {
            conv_in: ReBnConv::new(device, in_channels, out_channels, 1),
            enc1: ReBnConv::new(device, out_channels, mid_channels, 1),
            enc2: ReBnConv::new(device, mid_channels, mid_channels, 2),
            enc3: ReBnConv::new(device, mid_channels, mid_channels, 4),
            bottom: ReBnConv::new(device, mid_channels, mid_channels, 8),
            dec3: ReBnConv::new(device, mid_channels * 2, mid_channels, 4),
            dec2: ReBnConv::new(device, mid_channels * 2, mid_channels, 2),
            dec1: ReBnConv::new(device, mid_channels * 2, out_channels, 1),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let hxin = self.conv_in.forward(x);

        let hx1 = self.enc1.forward(hxin.clone());
        let hx2 = self.enc2.forward(hx1.clone());
        let hx3 = self.enc3.forward(hx2.clone());
        let hx4 = self.bottom.forward(hx3.clone());

        let hx3d = self.dec3.forward(Tensor::cat(vec![hx4, hx3], 1));
        let hx2d = self.dec2.forward(Tensor::cat(vec![hx3d, hx2], 1));
        let hx1d = self.dec1.forward(Tensor::cat(vec![hx2d, hx1], 1));

        hx1d + hxin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn rsu4f_preserves_shape() {
        let device = Default::default();
        let block = Rsu4F::<TestBackend>::new(&device, 8, 4, 8);
        let x = Tensor::zeros([1, 8, 7, 7], &device);
        assert_eq!(block.forward(x).dims(), [1, 8, 7, 7]);
    }
}
