//! Utility modules for dataset generation
//!
//! - `files`: Directory scanning and output directory setup
//! - `images`: Raster primitives shared by the composition pipeline

pub mod files;
pub mod images;
