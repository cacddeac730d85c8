use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect as DrawRect;

use crate::core::model::{CardRegion, PageImage, RecognizedLine};

const CARD_COLOR: Rgb<u8> = Rgb([0, 160, 0]);
const PRIMARY_COLOR: Rgb<u8> = Rgb([220, 0, 0]);
const SECONDARY_COLOR: Rgb<u8> = Rgb([0, 0, 220]);
const SPLIT_COLOR: Rgb<u8> = Rgb([255, 140, 0]);

/// Writes audit images: each page with its detected cards, and each card with
/// the OCR line polygons drawn over it.
///
/// The directory is emptied when the annotator is created, so a run never
/// shows images left over from a previous one.
#[derive(Debug, Clone)]
pub struct DebugAnnotator {
    out_dir: PathBuf,
}

impl DebugAnnotator {
    pub fn new(out_dir: PathBuf) -> Result<Self> {
        if out_dir.exists() {
            fs::remove_dir_all(&out_dir)
                .with_context(|| format!("failed to clear {}", out_dir.display()))?;
        }
        fs::create_dir_all(&out_dir)
            .with_context(|| format!("failed to create {}", out_dir.display()))?;
        Ok(Self { out_dir })
    }

    pub fn page(&self, page: &PageImage, regions: &[CardRegion]) -> Result<PathBuf> {
        let mut canvas = page.image.clone();
        for region in regions {
            let b = region.bbox;
            // three nested outlines so the box survives downscaling
            for inset in 0..3u32 {
                if b.width <= 2 * inset || b.height <= 2 * inset {
                    break;
                }
                let rect = DrawRect::at((b.x + inset) as i32, (b.y + inset) as i32)
                    .of_size(b.width - 2 * inset, b.height - 2 * inset);
                draw_hollow_rect_mut(&mut canvas, rect, CARD_COLOR);
            }
        }
        self.save(&canvas, format!("page_{:03}_cards.png", page.page_idx + 1))
    }

    pub fn card(
        &self,
        page_idx: usize,
        card_idx: usize,
        card: &RgbImage,
        split_x: u32,
        primary: &[RecognizedLine],
        secondary: &[RecognizedLine],
    ) -> Result<PathBuf> {
        let mut canvas = card.clone();
        if canvas.height() > 0 {
            let bottom = (canvas.height() - 1) as f32;
            draw_line_segment_mut(&mut canvas, (split_x as f32, 0.0), (split_x as f32, bottom), SPLIT_COLOR);
        }
        for line in primary {
            outline(&mut canvas, &line.polygon, 0.0, PRIMARY_COLOR);
        }
        for line in secondary {
            outline(&mut canvas, &line.polygon, split_x as f32, SECONDARY_COLOR);
        }
        self.save(
            &canvas,
            format!("page_{:03}_card_{:02}.png", page_idx + 1, card_idx + 1),
        )
    }

    fn save(&self, image: &RgbImage, file_name: String) -> Result<PathBuf> {
        let path = self.out_dir.join(file_name);
        image
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

fn outline(canvas: &mut RgbImage, polygon: &[[f32; 2]; 4], dx: f32, color: Rgb<u8>) {
    for i in 0..polygon.len() {
        let [x0, y0] = polygon[i];
        let [x1, y1] = polygon[(i + 1) % polygon.len()];
        draw_line_segment_mut(canvas, (x0 + dx, y0), (x1 + dx, y1), color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::Rect;

    #[test]
    fn recreates_directory_and_writes_images() -> Result<()> {
        let root = tempfile::tempdir()?;
        let dir = root.path().join("debug");
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("stale.png"), b"old")?;

        let annotator = DebugAnnotator::new(dir.clone())?;
        assert!(!dir.join("stale.png").exists());

        let page = PageImage {
            page_idx: 2,
            image: RgbImage::from_pixel(60, 40, Rgb([255, 255, 255])),
        };
        let region = CardRegion {
            page_idx: 2,
            bbox: Rect::new(5, 5, 30, 20),
            vertices: 4,
            area: 600.0,
        };
        let page_path = annotator.page(&page, &[region])?;
        assert_eq!(page_path, dir.join("page_003_cards.png"));

        let line = RecognizedLine::new("12", [[1.0, 1.0], [8.0, 1.0], [8.0, 6.0], [1.0, 6.0]], 0.9);
        let card_path = annotator.card(2, 0, &page.image, 42, &[line.clone()], &[line])?;
        assert!(card_path.exists());
        Ok(())
    }
}
