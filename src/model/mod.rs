pub mod blocks;
pub mod loss;
pub mod u2net;

pub use loss::FusionLoss;
pub use u2net::{ModelVariant, U2Net, CHANNELS};
