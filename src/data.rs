mod class_labels;
mod filesystem_access;
mod status;
mod time_calc;

pub use class_labels::ClassLabels;
pub use filesystem_access::FsAccess;
pub use status::Status;
pub use time_calc::{Laps, Phase, TimeCalc, PHASE_COUNT};
