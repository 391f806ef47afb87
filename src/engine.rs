mod inference_engine;
mod ort_engine;

pub use inference_engine::*;
pub use ort_engine::*;
