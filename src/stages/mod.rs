//! Pipeline stages, run in order: segment, sample, classify

pub mod classify;
pub mod sample;
pub mod segment;
