pub mod data;
pub mod model;
pub mod training;

// Re-exports for convenience
pub use data::{SalObjBatch, SalObjDataLoader, SalObjDataset};
pub use model::{FusionLoss, ModelVariant, U2Net};
pub use training::{EarlyStopping, TrainConfig, Trainer};
