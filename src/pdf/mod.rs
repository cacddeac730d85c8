pub mod reader;
pub mod renderer;

pub use reader::PdfReader;
pub use renderer::{PageRenderer, PageSource};
