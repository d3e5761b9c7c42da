//! Domain models for mirrored time-series data

mod point;

pub use point::{FieldValue, Point};
