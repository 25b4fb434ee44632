use burn::backend::{Autodiff, NdArray};
use clap::Parser;
use std::path::Path;

use u2net_segmentation::data::SalObjDataset;
use u2net_segmentation::model::ModelVariant;
use u2net_segmentation::training::{TrainConfig, Trainer};

/// Start training for the U2Net architecture.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// CSV path of the image list; without it the image folder is scanned
    #[arg(long)]
    image_name_csv_file: Option<String>,

    /// Path to load the images and masks from
    #[arg(long)]
    data_dir: String,

    /// Image subfolder name under the data dir
    #[arg(long, default_value = "masked")]
    img_folder: String,

    /// Mask subfolder name under the data dir
    #[arg(long, default_value = "original")]
    mask_folder: String,

    /// Number of images for each batch
    #[arg(long, default_value_t = 8)]
    batch_size: usize,

    /// Number of epochs
    #[arg(long, default_value_t = 1000)]
    epochs: usize,

    /// Patience for early stopping
    #[arg(long, default_value_t = 25)]
    patience: usize,

    /// Resize images to this value (the random crop is derived from it)
    #[arg(long, default_value_t = 320)]
    image_size: u32,

    /// Path to store the checkpoints
    #[arg(long, default_value = "saved_models")]
    model_dir: String,

    /// Path to reload a trained model
    #[arg(long)]
    warm_start: Option<String>,

    /// Deep learning architecture
    #[arg(long, default_value = "u2net")]
    model_name: ModelVariant,

    /// Fixed RNG seed for shuffling and augmentation
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    println!("🚀 U2Net Training (Burn, CPU)");
    println!("=============================\n");

    // CPU backend; swap the aliases to target an accelerated backend.
    type MyBackend = NdArray;
    type MyAutodiffBackend = Autodiff<MyBackend>;
    let device = Default::default();

    let data_root = Path::new(&args.data_dir);
    let dataset = match &args.image_name_csv_file {
        Some(csv) => SalObjDataset::from_manifest(
            data_root,
            Path::new(csv),
            &args.img_folder,
            &args.mask_folder,
            "ImageId",
        )?,
        None => SalObjDataset::from_folders(data_root, &args.img_folder, &args.mask_folder)?,
    };
    println!("✅ Loaded {} samples", dataset.len());
    if !dataset.has_labels() {
        eprintln!("⚠️  No masks found, training targets will be empty");
    }

    let config = TrainConfig {
        model_name: args.model_name,
        epochs: args.epochs,
        batch_size: args.batch_size,
        patience: args.patience,
        image_size: args.image_size,
        model_dir: args.model_dir,
        warm_start: args.warm_start,
        seed: args.seed,
        ..Default::default()
    };

    println!("\n📊 Training Configuration:");
    println!("  Architecture: {}", config.model_name);
    println!("  Epochs: {}", config.epochs);
    println!("  Batch size: {}", config.batch_size);
    println!("  Learning rate: {}", config.learning_rate);
    println!("  Image size: {} (crop {})", config.image_size, config.crop_size());
    println!("  Patience: {}", config.patience);
    println!("  Workers: {}", config.num_workers);
    println!("  Model dir: {}\n", config.model_dir);

    std::fs::create_dir_all(&config.model_dir)?;
    config.save(&format!("{}/train_config.yaml", config.model_dir))?;

    let mut trainer = Trainer::<MyAutodiffBackend>::new(config, device)?;
    trainer.train(dataset)?;

    println!("\n✅ Training finished");
    Ok(())
}
