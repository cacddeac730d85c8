pub mod annotate;
pub mod json_export;
pub mod xlsx_export;

use anyhow::Result;
use std::path::PathBuf;

use crate::core::model::VoterRecord;

pub use annotate::DebugAnnotator;
pub use json_export::JsonExporter;
pub use xlsx_export::XlsxExporter;

/// Writes the ordered voter table somewhere and returns where.
pub trait Exporter {
    fn export(&self, rows: &[VoterRecord]) -> Result<PathBuf>;
}
