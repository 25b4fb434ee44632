use burn::backend::NdArray;
use burn::prelude::*;
use clap::Parser;
use image::{Rgb32FImage, RgbImage};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;

use u2net_segmentation::data::dataset::decode_rgb;
use u2net_segmentation::data::transforms::{chw_to_hwc, RescaleT, Sample, ToTensorLab, Transform};
use u2net_segmentation::model::ModelVariant;
use u2net_segmentation::training::load_checkpoint;

/// Predict the saliency map of a single image from a saved checkpoint.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the input image
    #[arg(short, long)]
    image: String,

    /// Path to a .pth checkpoint written by the trainer
    #[arg(short, long)]
    weights: String,

    /// Architecture the checkpoint was trained with
    #[arg(long, default_value = "u2net")]
    model_name: ModelVariant,

    /// Network input size
    #[arg(long, default_value_t = 320)]
    image_size: u32,

    /// Where to write the predicted mask
    #[arg(short, long, default_value = "mask.png")]
    output: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    println!("U2Net Inference (CPU)");
    println!("  Image: {}", args.image);
    println!("  Weights: {}", args.weights);
    println!();

    type MyBackend = NdArray;
    let device = Default::default();

    let model = args.model_name.build::<MyBackend>(&device);
    let model = load_checkpoint(model, Path::new(&args.weights), &device)?;

    let image = decode_rgb(Path::new(&args.image))?;
    let label = Rgb32FImage::new(image.width(), image.height());
    let sample = Sample {
        index: 0,
        image,
        label,
    };

    // Deterministic preprocessing: the squashing resize draws no randomness.
    let mut rng = StdRng::from_entropy();
    let sample = RescaleT::new(args.image_size).apply(sample, &mut rng);
    let tensor = ToTensorLab.apply(sample);

    let size = args.image_size as usize;
    let input = Tensor::<MyBackend, 4>::from_data(
        TensorData::new(tensor.image, [1, 3, size, size]),
        &device,
    );

    println!("Running inference...");
    let [d0, ..] = model.forward(input);

    let chw: Vec<f32> = d0.into_data().convert::<f32>().to_vec().unwrap();
    let hwc = chw_to_hwc(&chw, size, size, 3);
    let mut mask = RgbImage::new(args.image_size, args.image_size);
    for (i, pixel) in mask.pixels_mut().enumerate() {
        for c in 0..3 {
            pixel[c] = (hwc[i * 3 + c].clamp(0.0, 1.0) * 255.0) as u8;
        }
    }
    mask.save(&args.output)?;

    println!("✅ Saliency map written to {}", args.output);
    Ok(())
}
