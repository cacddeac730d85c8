pub mod core;
pub mod dataset;
pub mod export;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod profile;
pub mod vision;

pub use core::model::{Profile, VoterRecord};
pub use pipeline::{build_dataset, export_dataset, PipelineConfig, RunReport};
