//! Instruction semantics that are more than a single Rust operator.

pub mod conversion;
pub mod float;
pub mod numeric;
