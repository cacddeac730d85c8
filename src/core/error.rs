use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("page {page_idx}: expected at least 2 quadrilateral candidates, found {found}")]
    InsufficientRegions { page_idx: usize, found: usize },

    #[error("OCR bridge failed: {0}")]
    OcrBridge(String),

    #[error("page {page_idx} card {card_idx}: no text recognized in the serial-number column")]
    EmptyCard { page_idx: usize, card_idx: usize },
}

/// Conditions that cost data but do not stop the run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineWarning {
    InsufficientRegions { page_idx: usize, found: usize },
    DroppedCard { page_idx: usize, card_idx: usize },
    WorkerTimeout { page_idx: usize, timeout: Duration },
    RejectedCard { page_idx: usize, card_idx: usize },
    OcrFailed { page_idx: usize, reason: String },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineWarning::InsufficientRegions { page_idx, found } => write!(
                f,
                "page {page_idx} skipped: {found} card candidate(s) detected"
            ),
            PipelineWarning::DroppedCard { page_idx, card_idx } => write!(
                f,
                "page {page_idx} card {card_idx} dropped: serial-number column was empty"
            ),
            PipelineWarning::WorkerTimeout { page_idx, timeout } => write!(
                f,
                "page {page_idx}: OCR workers exceeded {}ms, re-ran sequentially",
                timeout.as_millis()
            ),
            PipelineWarning::RejectedCard { page_idx, card_idx } => write!(
                f,
                "page {page_idx} card {card_idx} rejected as a deleted entry"
            ),
            PipelineWarning::OcrFailed { page_idx, reason } => {
                write!(f, "page {page_idx} skipped: OCR failed: {reason}")
            }
        }
    }
}

impl ScanError {
    /// The warning recorded when this error skips part of a run instead of failing it.
    pub fn as_warning(&self) -> Option<PipelineWarning> {
        match self {
            ScanError::InsufficientRegions { page_idx, found } => {
                Some(PipelineWarning::InsufficientRegions {
                    page_idx: *page_idx,
                    found: *found,
                })
            }
            ScanError::EmptyCard { page_idx, card_idx } => Some(PipelineWarning::DroppedCard {
                page_idx: *page_idx,
                card_idx: *card_idx,
            }),
            ScanError::OcrBridge(_) => None,
        }
    }
}
