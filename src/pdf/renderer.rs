use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Command;

use tempfile::TempDir;
use tracing::debug;

use crate::core::model::PageImage;
use crate::pdf::reader::PdfReader;

/// Supplies page rasters in document order.
pub trait PageSource {
    fn page_count(&self) -> Result<usize>;
    fn render_page(&self, page_idx: usize) -> Result<PageImage>;
}

/// Rasterizes pages with poppler's `pdftoppm`.
///
/// Each renderer owns a fresh temporary directory, removed on drop, so pages
/// from an earlier run can never be picked up by a later one.
#[derive(Debug)]
pub struct PageRenderer {
    reader: PdfReader,
    out_dir: TempDir,
    dpi: u32,
}

impl PageRenderer {
    pub fn new(reader: PdfReader, dpi: u32) -> Result<Self> {
        let out_dir = tempfile::Builder::new()
            .prefix("rollscan-pages-")
            .tempdir()
            .with_context(|| "failed to create page scratch directory")?;
        Ok(Self {
            reader,
            out_dir,
            dpi,
        })
    }

    fn rasterize(&self, page_idx: usize) -> Result<PathBuf> {
        // pdftoppm uses 1-based page indices
        let page_number = page_idx + 1;
        let prefix = self.out_dir.path().join(format!("page_{:03}", page_number));
        let prefix_str = prefix
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("non-UTF8 output path not supported"))?;

        let status = Command::new("pdftoppm")
            .arg("-png")
            .arg("-singlefile")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-f")
            .arg(page_number.to_string())
            .arg("-l")
            .arg(page_number.to_string())
            .arg(self.reader.path())
            .arg(prefix_str)
            .status()
            .with_context(|| "failed to invoke pdftoppm; is poppler-utils installed?")?;

        if !status.success() {
            anyhow::bail!("pdftoppm failed with status: {status}");
        }

        // -singlefile writes exactly `<prefix>.png`
        let image_path = prefix.with_extension("png");
        if !image_path.exists() {
            anyhow::bail!(
                "expected rendered image not found: {}",
                image_path.display()
            );
        }
        Ok(image_path)
    }
}

impl PageSource for PageRenderer {
    fn page_count(&self) -> Result<usize> {
        self.reader.page_count()
    }

    fn render_page(&self, page_idx: usize) -> Result<PageImage> {
        let path = self.rasterize(page_idx)?;
        let image = image::open(&path)
            .with_context(|| format!("failed to decode {}", path.display()))?
            .to_rgb8();
        debug!(
            page = page_idx,
            width = image.width(),
            height = image.height(),
            "rendered page"
        );
        // the raster now lives in memory only
        let _ = std::fs::remove_file(&path);
        Ok(PageImage { page_idx, image })
    }
}
