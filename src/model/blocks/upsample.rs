use burn::prelude::*;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};

/// Bilinear upsample of `x` to the spatial size of `reference`.
/// RSU decoders and the side outputs always resize to an exact skip or
/// input size, so this takes a reference tensor instead of a scale factor.
pub fn upsample_like<B: Backend>(x: Tensor<B, 4>, reference: &Tensor<B, 4>) -> Tensor<B, 4> {
    let [_, _, ref_h, ref_w] = reference.dims();
    let [_, _, h, w] = x.dims();
    if (h, w) == (ref_h, ref_w) {
        return x;
    }
    interpolate(
        x,
        [ref_h, ref_w],
        InterpolateOptions::new(InterpolateMode::Bilinear),
    )
}
