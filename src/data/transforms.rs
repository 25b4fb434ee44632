use image::imageops::{self, FilterType};
use image::Rgb32FImage;
use rand::{Rng, RngCore};

/// One image/mask pair plus its dataset index. Pixels are f32 in [0, 1],
/// stored HWC (the `image` crate's native layout). Image and label share
/// spatial dimensions after every transform stage.
#[derive(Debug, Clone)]
pub struct Sample {
    pub index: usize,
    pub image: Rgb32FImage,
    pub label: Rgb32FImage,
}

/// Sample after the layout conversion: CHW float buffers ready to stack
/// into a batch tensor.
#[derive(Debug, Clone)]
pub struct TensorSample {
    pub index: usize,
    pub image: Vec<f32>,
    pub label: Vec<f32>,
    pub height: u32,
    pub width: u32,
}

/// A sample-to-sample rewrite. Randomness comes from the caller so a fixed
/// seed makes the whole chain reproducible.
pub trait Transform: Send + Sync {
    fn apply(&self, sample: Sample, rng: &mut dyn RngCore) -> Sample;
}

/// Ordered composition of transforms, applied in sequence.
pub struct Compose {
    transforms: Vec<Box<dyn Transform>>,
}

impl Compose {
    pub fn new(transforms: Vec<Box<dyn Transform>>) -> Self {
        Self { transforms }
    }

    pub fn apply(&self, sample: Sample, rng: &mut dyn RngCore) -> Sample {
        let mut sample = sample;
        for t in &self.transforms {
            sample = t.apply(sample, rng);
        }
        sample
    }
}

fn resize_pair(sample: Sample, new_w: u32, new_h: u32) -> Sample {
    Sample {
        index: sample.index,
        image: imageops::resize(&sample.image, new_w, new_h, FilterType::Triangle),
        label: imageops::resize(&sample.label, new_w, new_h, FilterType::Triangle),
    }
}

fn flip_pair(sample: Sample) -> Sample {
    Sample {
        index: sample.index,
        image: imageops::flip_vertical(&sample.image),
        label: imageops::flip_vertical(&sample.label),
    }
}

/// Deterministic squash of both planes to `size x size`. Not
/// aspect-preserving.
pub struct RescaleT {
    output_size: u32,
}

impl RescaleT {
    pub fn new(output_size: u32) -> Self {
        Self { output_size }
    }
}

impl Transform for RescaleT {
    fn apply(&self, sample: Sample, _rng: &mut dyn RngCore) -> Sample {
        resize_pair(sample, self.output_size, self.output_size)
    }
}

/// Target for the aspect-preserving [`Rescale`] transform.
#[derive(Debug, Clone, Copy)]
pub enum RescaleSize {
    /// Scale the shorter dimension to this value, the other proportionally.
    Shorter(u32),
    /// Resize directly to (height, width).
    Exact(u32, u32),
}

/// Coin-flip vertical flip, then aspect-preserving resize.
pub struct Rescale {
    output_size: RescaleSize,
}

impl Rescale {
    pub fn new(output_size: RescaleSize) -> Self {
        Self { output_size }
    }
}

impl Transform for Rescale {
    fn apply(&self, sample: Sample, rng: &mut dyn RngCore) -> Sample {
        let sample = if rng.gen_bool(0.5) {
            flip_pair(sample)
        } else {
            sample
        };

        let (w, h) = sample.image.dimensions();
        let (new_h, new_w) = match self.output_size {
            RescaleSize::Shorter(size) => {
                if h > w {
                    ((size as u64 * h as u64 / w as u64) as u32, size)
                } else {
                    (size, (size as u64 * w as u64 / h as u64) as u32)
                }
            }
            RescaleSize::Exact(h, w) => (h, w),
        };

        resize_pair(sample, new_w, new_h)
    }
}

/// Coin-flip vertical flip, then a crop at a uniform random offset. The
/// image must already be at least crop-sized in both dimensions (a prior
/// rescale guarantees this).
pub struct RandomCrop {
    output_size: (u32, u32),
}

impl RandomCrop {
    pub fn new(size: u32) -> Self {
        Self {
            output_size: (size, size),
        }
    }

    pub fn new_rect(height: u32, width: u32) -> Self {
        Self {
            output_size: (height, width),
        }
    }
}

impl Transform for RandomCrop {
    fn apply(&self, sample: Sample, rng: &mut dyn RngCore) -> Sample {
        let sample = if rng.gen_bool(0.5) {
            flip_pair(sample)
        } else {
            sample
        };

        let (w, h) = sample.image.dimensions();
        let (crop_h, crop_w) = self.output_size;
        assert!(
            h >= crop_h && w >= crop_w,
            "crop {}x{} exceeds image {}x{}",
            crop_h,
            crop_w,
            h,
            w
        );

        let top = rng.gen_range(0..=h - crop_h);
        let left = rng.gen_range(0..=w - crop_w);

        Sample {
            index: sample.index,
            image: imageops::crop_imm(&sample.image, left, top, crop_w, crop_h).to_image(),
            label: imageops::crop_imm(&sample.label, left, top, crop_w, crop_h).to_image(),
        }
    }
}

/// Reorders both planes from HWC to CHW. A pure axis permutation, no
/// normalization.
pub struct ToTensorLab;

impl ToTensorLab {
    pub fn apply(&self, sample: Sample) -> TensorSample {
        let (w, h) = sample.image.dimensions();
        TensorSample {
            index: sample.index,
            image: hwc_to_chw(sample.image.as_raw(), h as usize, w as usize, 3),
            label: hwc_to_chw(sample.label.as_raw(), h as usize, w as usize, 3),
            height: h,
            width: w,
        }
    }
}

/// (H, W, C) -> (C, H, W)
pub fn hwc_to_chw(data: &[f32], height: usize, width: usize, channels: usize) -> Vec<f32> {
    debug_assert_eq!(data.len(), height * width * channels);
    let mut out = vec![0.0f32; data.len()];
    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                out[(c * height + y) * width + x] = data[(y * width + x) * channels + c];
            }
        }
    }
    out
}

/// (C, H, W) -> (H, W, C)
pub fn chw_to_hwc(data: &[f32], height: usize, width: usize, channels: usize) -> Vec<f32> {
    debug_assert_eq!(data.len(), height * width * channels);
    let mut out = vec![0.0f32; data.len()];
    for c in 0..channels {
        for y in 0..height {
            for x in 0..width {
                out[(y * width + x) * channels + c] = data[(c * height + y) * width + x];
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gradient_sample(width: u32, height: u32) -> Sample {
        let image = Rgb32FImage::from_fn(width, height, |x, y| {
            image::Rgb([x as f32 / width as f32, y as f32 / height as f32, 0.5])
        });
        let label = Rgb32FImage::from_fn(width, height, |x, y| {
            let v = if (x + y) % 2 == 0 { 1.0 } else { 0.0 };
            image::Rgb([v, v, v])
        });
        Sample {
            index: 0,
            image,
            label,
        }
    }

    #[test]
    fn rescale_t_squares_both_planes() {
        let mut rng = StdRng::seed_from_u64(7);
        let out = RescaleT::new(8).apply(gradient_sample(10, 6), &mut rng);
        assert_eq!(out.image.dimensions(), (8, 8));
        assert_eq!(out.label.dimensions(), (8, 8));
    }

    #[test]
    fn rescale_scales_shorter_dimension() {
        let mut rng = StdRng::seed_from_u64(7);
        // 6 wide, 12 tall: the width is the shorter side.
        let out = Rescale::new(RescaleSize::Shorter(3)).apply(gradient_sample(6, 12), &mut rng);
        assert_eq!(out.image.dimensions(), (3, 6));
        assert_eq!(out.label.dimensions(), (3, 6));
    }

    #[test]
    fn rescale_exact_pair() {
        let mut rng = StdRng::seed_from_u64(1);
        let out = Rescale::new(RescaleSize::Exact(4, 9)).apply(gradient_sample(6, 12), &mut rng);
        assert_eq!(out.image.dimensions(), (9, 4));
    }

    #[test]
    fn random_crop_output_size_and_bounds() {
        for seed in 0..16 {
            let mut rng = StdRng::seed_from_u64(seed);
            let out = RandomCrop::new(8).apply(gradient_sample(12, 12), &mut rng);
            assert_eq!(out.image.dimensions(), (8, 8));
            assert_eq!(out.label.dimensions(), (8, 8));
        }
    }

    #[test]
    fn random_crop_exact_size_is_valid() {
        // H - S == 0: the only legal offset is 0, and it must not panic.
        let mut rng = StdRng::seed_from_u64(3);
        let out = RandomCrop::new(8).apply(gradient_sample(8, 8), &mut rng);
        assert_eq!(out.image.dimensions(), (8, 8));
    }

    #[test]
    fn random_crop_deterministic_under_fixed_seed() {
        let a = RandomCrop::new(6).apply(gradient_sample(12, 12), &mut StdRng::seed_from_u64(42));
        let b = RandomCrop::new(6).apply(gradient_sample(12, 12), &mut StdRng::seed_from_u64(42));
        assert_eq!(a.image.as_raw(), b.image.as_raw());
        assert_eq!(a.label.as_raw(), b.label.as_raw());
    }

    #[test]
    fn layout_permutation_round_trips_exactly() {
        let (h, w, c) = (5, 7, 3);
        let data: Vec<f32> = (0..h * w * c).map(|i| i as f32 * 0.37).collect();
        let chw = hwc_to_chw(&data, h, w, c);
        let back = chw_to_hwc(&chw, h, w, c);
        assert_eq!(back, data);
    }

    #[test]
    fn to_tensor_lab_is_a_permutation() {
        let sample = gradient_sample(4, 3);
        let hwc = sample.image.as_raw().clone();
        let tensor = ToTensorLab.apply(sample);
        assert_eq!(tensor.image.len(), hwc.len());
        assert_eq!(chw_to_hwc(&tensor.image, 3, 4, 3), hwc);
        // First subpixel is channel 0 at (0, 0) in both layouts.
        assert_eq!(tensor.image[0], hwc[0]);
    }

    #[test]
    fn compose_applies_in_order() {
        let chain = Compose::new(vec![
            Box::new(RescaleT::new(12)),
            Box::new(RandomCrop::new(10)),
        ]);
        let mut rng = StdRng::seed_from_u64(9);
        let out = chain.apply(gradient_sample(30, 20), &mut rng);
        assert_eq!(out.image.dimensions(), (10, 10));
    }
}
