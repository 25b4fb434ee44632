pub mod dataloader;
pub mod dataset;
pub mod transforms;

pub use dataloader::{default_num_workers, SalObjBatch, SalObjDataLoader};
pub use dataset::SalObjDataset;
pub use transforms::{
    Compose, RandomCrop, Rescale, RescaleSize, RescaleT, Sample, TensorSample, ToTensorLab,
    Transform,
};
