//! Common Utilities and Types Library
//! 
//! This crate provides shared types and utilities used across the scheduler implementation.

pub mod bitmap;
pub mod interval;
pub mod slot_point;
pub mod types;

// Re-export commonly used items
pub use bitmap::BoundedBitmap;
pub use interval::*;
pub use slot_point::*;
pub use types::*;
