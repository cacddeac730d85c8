pub mod detector;
pub mod splitter;

pub use detector::CardDetector;
pub use splitter::CardSplitter;
