use serde::{Deserialize, Serialize};

use crate::model::ModelVariant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    // Architecture
    pub model_name: ModelVariant,

    // Training
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,

    // Early stopping
    pub patience: usize,
    pub min_delta: f32,

    // Augmentation
    pub image_size: u32,

    // Checkpointing
    pub model_dir: String,
    pub warm_start: Option<String>,

    // Data loading
    pub num_workers: usize,
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            model_name: ModelVariant::U2Net,
            epochs: 1000,
            batch_size: 8,
            learning_rate: 0.001,
            patience: 25,
            min_delta: 0.0,
            image_size: 320,
            model_dir: "saved_models".to_string(),
            warm_start: None,
            num_workers: crate::data::default_num_workers(),
            seed: None,
        }
    }
}

impl TrainConfig {
    /// Crop window fed to `RandomCrop` after the `RescaleT(image_size)`
    /// stage: ceil(size - size/10). 320 -> 288.
    pub fn crop_size(&self) -> u32 {
        (self.image_size as f64 - self.image_size as f64 / 10.0).ceil() as u32
    }

    /// Write a YAML copy of this config next to the checkpoints.
    pub fn save(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_size_matches_the_training_recipe() {
        let config = TrainConfig {
            image_size: 320,
            ..Default::default()
        };
        assert_eq!(config.crop_size(), 288);

        let config = TrainConfig {
            image_size: 284,
            ..Default::default()
        };
        // ceil(284 - 28.4) = 256
        assert_eq!(config.crop_size(), 256);
    }
}
