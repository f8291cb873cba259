pub mod level;

pub use level::{normalized_level, rms, rms_to_db};
