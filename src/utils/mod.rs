//! Utils Module
pub mod code;
pub mod telemetry;
pub mod truncate;

pub use truncate::{preview, truncate_middle};
