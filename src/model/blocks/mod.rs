pub mod rebnconv;
pub mod rsu;
pub mod rsu4f;
pub mod upsample;

pub use rebnconv::ReBnConv;
pub use rsu::Rsu;
pub use rsu4f::Rsu4F;
pub use upsample::upsample_like;
