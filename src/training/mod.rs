pub mod config;
pub mod early_stopping;
pub mod trainer;

pub use config::TrainConfig;
pub use early_stopping::EarlyStopping;
pub use trainer::{checkpoint_filename, load_checkpoint, save_checkpoint, Trainer};
