use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::data::{Compose, RandomCrop, RescaleT, SalObjDataLoader, SalObjDataset};
use crate::model::{FusionLoss, U2Net};
use crate::training::{EarlyStopping, TrainConfig};

/// Checkpoint name contract: iteration count plus both running-loss
/// averages at 6-decimal precision. Names are unique per epoch because the
/// iteration counter is strictly increasing, so checkpoints accumulate and
/// are never overwritten.
pub fn checkpoint_filename(
    model_name: &str,
    ite_num: usize,
    running_loss: f32,
    running_tar_loss: f32,
) -> String {
    format!("{model_name}_bce_itr_{ite_num}_train_{running_loss:.6}_tar_{running_tar_loss:.6}.pth")
}

/// Serialize all trainable parameters to `path` under the exact given
/// name. burn's file recorders rewrite the extension, so the record goes
/// through bytes and `fs::write`.
pub fn save_checkpoint<B: Backend>(model: &U2Net<B>, path: &Path) -> Result<(), Box<dyn Error>> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let bytes = recorder
        .record(model.clone().into_record(), ())
        .map_err(|e| format!("failed to serialize checkpoint: {e:?}"))?;
    std::fs::write(path, bytes)?;
    log::info!("checkpoint saved: {}", path.display());
    Ok(())
}

/// Warm start: load a previously saved parameter snapshot into a freshly
/// built model of the same architecture variant.
pub fn load_checkpoint<B: Backend>(
    model: U2Net<B>,
    path: &Path,
    device: &B::Device,
) -> Result<U2Net<B>, Box<dyn Error>> {
    let bytes = std::fs::read(path)
        .map_err(|e| format!("failed to read checkpoint {}: {e}", path.display()))?;
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let record = recorder
        .load(bytes, device)
        .map_err(|e| format!("failed to decode checkpoint {}: {e:?}", path.display()))?;
    Ok(model.load_record(record))
}

pub struct Trainer<B: AutodiffBackend> {
    pub model: U2Net<B>,
    optimizer: OptimizerAdaptor<Adam, U2Net<B>, B>,
    config: TrainConfig,
    device: B::Device,
    early_stopping: EarlyStopping,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: TrainConfig, device: B::Device) -> Result<Self, Box<dyn Error>> {
        let mut model = config.model_name.build::<B>(&device);

        if let Some(warm_start) = &config.warm_start {
            println!("Warm starting from {}", warm_start);
            model = load_checkpoint(model, Path::new(warm_start), &device)?;
        }

        // Fixed optimizer recipe: Adam, lr from config, betas 0.9/0.999,
        // eps 1e-8, no weight decay.
        let optimizer = AdamConfig::new()
            .with_beta_1(0.9)
            .with_beta_2(0.999)
            .with_epsilon(1e-8)
            .init();

        let early_stopping = EarlyStopping::new(config.patience, config.min_delta);

        Ok(Self {
            model,
            optimizer,
            config,
            device,
            early_stopping,
        })
    }

    pub fn train(&mut self, dataset: SalObjDataset) -> Result<(), Box<dyn Error>> {
        std::fs::create_dir_all(&self.config.model_dir)?;
        self.write_metadata()?;

        let dataset = Arc::new(dataset);
        let transform = Arc::new(Compose::new(vec![
            Box::new(RescaleT::new(self.config.image_size)),
            Box::new(RandomCrop::new(self.config.crop_size())),
        ]));

        println!(
            "Training {} on {} samples ({} -> crop {})",
            self.config.model_name,
            dataset.len(),
            self.config.image_size,
            self.config.crop_size()
        );

        let mut ite_num: usize = 0;
        let mut running_loss: f32 = 0.0;
        let mut running_tar_loss: f32 = 0.0;
        let mut ite_num4val: usize = 0;
        let mut stopped_early = false;

        for epoch in 1..=self.config.epochs {
            let epoch_start = Instant::now();

            let loader: SalObjDataLoader<B> = SalObjDataLoader::new(
                Arc::clone(&dataset),
                Arc::clone(&transform),
                self.config.batch_size,
                true,
                self.config.num_workers,
                self.config.seed.map(|s| s.wrapping_add(epoch as u64)),
                self.device.clone(),
            );

            let pb = ProgressBar::new(loader.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                    .unwrap(),
            );

            for batch in loader {
                ite_num += 1;
                ite_num4val += 1;

                let outputs = self.model.forward(batch.images);
                let (tar_loss, loss) = FusionLoss::fuse(&outputs, batch.labels);

                let loss_value = loss.clone().into_scalar().elem::<f32>();
                let tar_value = tar_loss.into_scalar().elem::<f32>();

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &self.model);
                self.model =
                    self.optimizer
                        .step(self.config.learning_rate, self.model.clone(), grads);

                running_loss += loss_value;
                running_tar_loss += tar_value;

                pb.set_message(format!("loss={:.4}", loss_value));
                pb.inc(1);
            }
            pb.finish_and_clear();

            let batches = ite_num4val.max(1) as f32;
            let avg_loss = running_loss / batches;
            let avg_tar_loss = running_tar_loss / batches;
            println!(
                "[epoch: {:3}/{:3}, ite: {}] train loss: {:.6}, tar: {:.6} ({:.2}s)",
                epoch,
                self.config.epochs,
                ite_num,
                avg_loss,
                avg_tar_loss,
                epoch_start.elapsed().as_secs_f32()
            );

            // The policy watches the epoch's cumulative loss, not the
            // average.
            let stop = self.early_stopping.should_stop(running_loss);

            let filename = checkpoint_filename(
                self.config.model_name.as_str(),
                ite_num,
                avg_loss,
                avg_tar_loss,
            );
            save_checkpoint(&self.model, &Path::new(&self.config.model_dir).join(filename))?;

            running_loss = 0.0;
            running_tar_loss = 0.0;
            ite_num4val = 0;

            if stop {
                println!("Early stopping at epoch {}", epoch);
                stopped_early = true;
                break;
            }
        }

        if !stopped_early {
            println!("Completed all {} epochs", self.config.epochs);
        }
        println!("Checkpoints saved in: {}", self.config.model_dir);
        Ok(())
    }

    fn write_metadata(&self) -> Result<(), Box<dyn Error>> {
        let meta = serde_json::json!({
            "model_type": self.config.model_name.as_str(),
            "image_size": self.config.image_size,
            "crop_size": self.config.crop_size(),
            "batch_size": self.config.batch_size,
            "learning_rate": self.config.learning_rate,
        });
        let path = Path::new(&self.config.model_dir).join("config.json");
        std::fs::write(&path, serde_json::to_string_pretty(&meta)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelVariant;
    use burn::backend::{Autodiff, NdArray};
    use image::{Rgb, RgbImage};

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<NdArray>;

    #[test]
    fn checkpoint_filename_matches_the_contract() {
        assert_eq!(
            checkpoint_filename("u2net", 100, 0.123456, 0.654321),
            "u2net_bce_itr_100_train_0.123456_tar_0.654321.pth"
        );
    }

    #[test]
    fn checkpoint_round_trips_through_bytes() {
        let device = Default::default();
        let model = ModelVariant::U2NetP.build::<TestBackend>(&device);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(checkpoint_filename("u2netp", 1, 0.5, 0.25));

        save_checkpoint(&model, &path).unwrap();
        assert!(path.exists());

        let x = Tensor::random(
            [1, 3, 32, 32],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let [expected, ..] = model.forward(x.clone());

        let fresh = ModelVariant::U2NetP.build::<TestBackend>(&device);
        let restored = load_checkpoint(fresh, &path, &device).unwrap();
        let [actual, ..] = restored.forward(x);

        let expected: Vec<f32> = expected.into_data().convert::<f32>().to_vec().unwrap();
        let actual: Vec<f32> = actual.into_data().convert::<f32>().to_vec().unwrap();
        assert_eq!(expected.len(), actual.len());
        for (e, a) in expected.iter().zip(&actual) {
            assert!((e - a).abs() < 1e-6, "restored model diverged: {e} vs {a}");
        }
    }

    #[test]
    fn one_epoch_smoke_train_writes_a_checkpoint() {
        let root = tempfile::tempdir().unwrap();
        let img_dir = root.path().join("masked");
        let mask_dir = root.path().join("original");
        std::fs::create_dir_all(&img_dir).unwrap();
        std::fs::create_dir_all(&mask_dir).unwrap();
        for i in 0..2 {
            RgbImage::from_pixel(40, 40, Rgb([120, 60, 30]))
                .save(img_dir.join(format!("s{i}.jpg")))
                .unwrap();
            RgbImage::from_pixel(40, 40, Rgb([255, 255, 255]))
                .save(mask_dir.join(format!("s{i}.jpg")))
                .unwrap();
        }
        let dataset =
            SalObjDataset::from_folders(root.path(), "masked", "original").unwrap();

        let model_dir = root.path().join("runs");
        let config = TrainConfig {
            model_name: ModelVariant::U2NetP,
            epochs: 1,
            batch_size: 2,
            patience: 5,
            image_size: 36,
            model_dir: model_dir.to_string_lossy().into_owned(),
            num_workers: 1,
            seed: Some(0),
            ..Default::default()
        };

        let mut trainer = Trainer::<TestAutodiffBackend>::new(config, Default::default()).unwrap();
        trainer.train(dataset).unwrap();

        let checkpoints: Vec<_> = std::fs::read_dir(&model_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".pth"))
            .collect();
        assert_eq!(checkpoints.len(), 1);
        assert!(checkpoints[0].starts_with("u2netp_bce_itr_1_train_"));
        assert!(model_dir.join("config.json").exists());
    }
}
