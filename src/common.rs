mod box_encoding;
mod detection_candidate;
mod inference_device;
mod port_config;
mod tensor_descriptor;

pub use box_encoding::*;
pub use detection_candidate::*;
pub use inference_device::*;
pub use port_config::*;
pub use tensor_descriptor::*;
