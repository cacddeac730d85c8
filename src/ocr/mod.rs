pub mod bridge;
pub mod orchestrator;

use anyhow::Result;
use image::RgbImage;

use crate::core::model::RecognizedLine;

pub use bridge::OcrBridge;
pub use orchestrator::{assemble_cards, OcrOrchestrator, PagePasses};

/// An OCR engine instance.
///
/// Lines come back top-to-bottom, left-to-right. An image with no detections
/// yields an empty list, not an error. Engines move onto worker threads, so
/// they must be `Send`.
pub trait TextRecognizer: Send {
    fn recognize(&mut self, image: &RgbImage) -> Result<Vec<RecognizedLine>>;
}

/// Builds one recognizer per worker; recognizers themselves are never shared.
pub trait RecognizerFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn TextRecognizer>>;
}

impl<F> RecognizerFactory for F
where
    F: Fn() -> Result<Box<dyn TextRecognizer>> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn TextRecognizer>> {
        self()
    }
}
