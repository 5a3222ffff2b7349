//! Validation of paths, offsets and operation logs.

pub mod preflight;
pub mod rules;

pub use rules::{validate_component, validate_offset, validate_range, validate_write_range};
