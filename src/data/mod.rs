//! Dataset storage.
//!
//! - [`dataset`]: folder and file naming of a run
//! - [`metadata`]: the control record written next to every run
//! - [`frame_io`]: lossless frame files

pub mod dataset;
pub mod frame_io;
pub mod metadata;

pub use dataset::{AngleFolders, DatasetLayout, Polarization};
pub use metadata::{MetadataRecord, MetadataValue};
