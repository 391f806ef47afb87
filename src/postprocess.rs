mod nms;

pub use nms::*;
