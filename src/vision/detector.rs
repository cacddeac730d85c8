use image::RgbImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::morphology::dilate;
use imageproc::point::Point;
use tracing::debug;

use crate::core::error::ScanError;
use crate::core::geometry::{bounding_rect, polygon_area};
use crate::core::model::{CardRegion, PageImage};

/// Finds voter cards on a page by looking for large quadrilateral outlines.
#[derive(Debug, Clone)]
pub struct CardDetector {
    canny_low: f32,
    canny_high: f32,
    /// Polygon tolerance as a fraction of the contour perimeter.
    epsilon_factor: f64,
    /// Radius used to close pixel gaps in the edge map before tracing. 0 disables.
    edge_dilation: u8,
}

impl Default for CardDetector {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            epsilon_factor: 0.04,
            edge_dilation: 0,
        }
    }
}

struct Candidate {
    polygon: Vec<Point<i32>>,
    area: f64,
}

impl CardDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_edge_dilation(mut self, radius: u8) -> Self {
        self.edge_dilation = radius;
        self
    }

    /// Card regions of one page, largest first.
    ///
    /// Every candidate at least as large as the second-largest one is kept,
    /// which drops small quadrilaterals traced from print noise.
    pub fn detect(&self, page: &PageImage) -> Result<Vec<CardRegion>, ScanError> {
        let gray = image::imageops::grayscale(&page.image);
        let mut edges = canny(&gray, self.canny_low, self.canny_high);
        if self.edge_dilation > 0 {
            edges = dilate(&edges, Norm::LInf, self.edge_dilation);
        }

        let mut candidates: Vec<Candidate> = find_contours::<i32>(&edges)
            .into_iter()
            .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
            .filter_map(|contour| {
                let polygon = approximate_closed(&contour.points, self.epsilon_factor);
                (polygon.len() == 4).then(|| Candidate {
                    area: polygon_area(&polygon),
                    polygon,
                })
            })
            .collect();

        // stable, so equal areas keep tracing order
        candidates.sort_by(|a, b| b.area.total_cmp(&a.area));
        debug!(page = page.page_idx, candidates = candidates.len(), "quadrilaterals traced");

        if candidates.len() < 2 {
            return Err(ScanError::InsufficientRegions {
                page_idx: page.page_idx,
                found: candidates.len(),
            });
        }

        let threshold = candidates[1].area;
        let regions = candidates
            .into_iter()
            .take_while(|candidate| candidate.area >= threshold)
            .filter_map(|candidate| {
                let bbox = bounding_rect(&candidate.polygon)?;
                Some(CardRegion {
                    page_idx: page.page_idx,
                    bbox: bbox.clamp_to(page.image.width(), page.image.height()),
                    vertices: candidate.polygon.len(),
                    area: candidate.area,
                })
            })
            .collect();
        Ok(regions)
    }

    /// Copies a detected card out of its page.
    pub fn crop(page: &PageImage, region: &CardRegion) -> RgbImage {
        let r = region.bbox.clamp_to(page.image.width(), page.image.height());
        image::imageops::crop_imm(&page.image, r.x, r.y, r.width, r.height).to_image()
    }
}

/// Douglas-Peucker on a closed contour.
///
/// The contour is cut at the point farthest from its start so neither half has
/// coincident endpoints, then vertices closer than the tolerance are merged,
/// including across the seam.
fn approximate_closed(points: &[Point<i32>], epsilon_factor: f64) -> Vec<Point<i32>> {
    if points.len() < 4 {
        return points.to_vec();
    }
    let epsilon = epsilon_factor * arc_length(points, true);
    if epsilon <= 0.0 {
        return points.to_vec();
    }

    let origin = points[0];
    let far = points
        .iter()
        .enumerate()
        .max_by_key(|(_, p)| squared_distance(&origin, p))
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    if far == 0 {
        return vec![origin];
    }

    let mut polygon = simplify_open(&points[..=far], epsilon);
    polygon.pop();
    polygon.extend(simplify_open(&points[far..], epsilon));

    let mut merged: Vec<Point<i32>> = Vec::with_capacity(polygon.len());
    for p in polygon {
        let keep = merged
            .last()
            .map_or(true, |last| (squared_distance(last, &p) as f64).sqrt() > epsilon);
        if keep {
            merged.push(p);
        }
    }
    while merged.len() > 1
        && (squared_distance(&merged[merged.len() - 1], &merged[0]) as f64).sqrt() <= epsilon
    {
        merged.pop();
    }
    merged
}

fn simplify_open(curve: &[Point<i32>], epsilon: f64) -> Vec<Point<i32>> {
    if curve.len() < 3 {
        return curve.to_vec();
    }
    approximate_polygon_dp(curve, epsilon, false)
}

fn squared_distance(a: &Point<i32>, b: &Point<i32>) -> i64 {
    let dx = (a.x - b.x) as i64;
    let dy = (a.y - b.y) as i64;
    dx * dx + dy * dy
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
    use imageproc::rect::Rect as DrawRect;
    use pretty_assertions::assert_eq;

    const INK: Rgb<u8> = Rgb([0, 0, 0]);

    /// A 2px card border with a line of "text" inside, the way cards are printed.
    fn draw_card(image: &mut RgbImage, x: i32, y: i32, w: u32, h: u32) {
        draw_hollow_rect_mut(image, DrawRect::at(x, y).of_size(w, h), INK);
        draw_hollow_rect_mut(image, DrawRect::at(x + 1, y + 1).of_size(w - 2, h - 2), INK);
        if w > 80 && h > 60 {
            draw_filled_rect_mut(image, DrawRect::at(x + 30, y + h as i32 / 2).of_size(w - 60, 12), INK);
        }
    }

    fn page_with(cards: &[(i32, i32, u32, u32)]) -> PageImage {
        let mut image = RgbImage::from_pixel(900, 700, Rgb([255, 255, 255]));
        for &(x, y, w, h) in cards {
            draw_card(&mut image, x, y, w, h);
        }
        PageImage { page_idx: 4, image }
    }

    fn grid_page(gap: u32) -> PageImage {
        let (w, h, margin) = (360u32, 250u32, 20u32);
        let width = 2 * margin + 3 * w + 2 * gap;
        let height = 2 * margin + 3 * h + 2 * gap;
        let mut image = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
        for row in 0..3 {
            for col in 0..3 {
                let x = margin + col * (w + gap);
                let y = margin + row * (h + gap);
                draw_card(&mut image, x as i32, y as i32, w, h);
            }
        }
        PageImage { page_idx: 7, image }
    }

    #[test]
    fn keeps_cards_down_to_second_largest() {
        let page = page_with(&[(40, 40, 300, 150), (420, 40, 280, 140), (40, 400, 260, 130)]);
        let regions = CardDetector::new().detect(&page).unwrap();

        assert_eq!(regions.len(), 2);
        assert!(regions[0].area >= regions[1].area);
        assert!(regions.iter().all(|r| r.vertices == 4 && r.page_idx == 4));
        // largest first
        assert!((regions[0].bbox.x as i32 - 40).abs() <= 6);
        assert!((regions[1].bbox.x as i32 - 420).abs() <= 6);
    }

    #[test]
    fn bounding_box_tracks_card_outline() {
        let page = page_with(&[(100, 80, 320, 160), (500, 80, 320, 160)]);
        let regions = CardDetector::new().detect(&page).unwrap();

        assert_eq!(regions.len(), 2);
        for region in &regions {
            assert!((region.bbox.y as i32 - 80).abs() <= 6, "{region:?}");
            assert!((region.bbox.width as i32 - 320).abs() <= 12, "{region:?}");
            assert!((region.bbox.height as i32 - 160).abs() <= 12, "{region:?}");
        }
    }

    #[test]
    fn drops_small_noise_quads() {
        let page = page_with(&[
            (40, 40, 300, 150),
            (420, 40, 300, 150),
            (40, 400, 40, 30),
            (200, 450, 50, 25),
        ]);
        let regions = CardDetector::new().detect(&page).unwrap();
        let threshold = regions[1].area;

        assert_eq!(regions.len(), 2);
        assert!(regions.iter().all(|r| r.area >= threshold));
        assert!(regions.windows(2).all(|w| w[0].area >= w[1].area));
    }

    #[test]
    fn tightly_packed_grid_keeps_every_card() {
        for gap in [4, 6, 12] {
            let regions = CardDetector::new().detect(&grid_page(gap)).unwrap();
            assert_eq!(regions.len(), 9, "gap {gap}");
            assert!(regions.iter().all(|r| r.vertices == 4 && r.page_idx == 7));
        }
    }

    #[test]
    fn edge_dilation_merges_touching_cards() {
        let detector = CardDetector::new().with_edge_dilation(2);
        assert!(matches!(
            detector.detect(&grid_page(4)),
            Err(ScanError::InsufficientRegions { found: 1, .. })
        ));
    }

    #[test]
    fn single_card_is_an_error() {
        let page = page_with(&[(40, 40, 300, 150)]);
        match CardDetector::new().detect(&page) {
            Err(ScanError::InsufficientRegions { page_idx, found }) => {
                assert_eq!(page_idx, 4);
                assert_eq!(found, 1);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn blank_page_is_an_error() {
        let page = page_with(&[]);
        assert!(matches!(
            CardDetector::new().detect(&page),
            Err(ScanError::InsufficientRegions { found: 0, .. })
        ));
    }

    #[test]
    fn closed_approximation_of_rectangle_has_four_corners() {
        let mut outline = Vec::new();
        for x in 0..100 {
            outline.push(Point::new(x, 0));
        }
        for y in 0..50 {
            outline.push(Point::new(100, y));
        }
        for x in (1..=100).rev() {
            outline.push(Point::new(x, 50));
        }
        for y in (1..=50).rev() {
            outline.push(Point::new(0, y));
        }
        let polygon = approximate_closed(&outline, 0.04);
        assert_eq!(polygon.len(), 4);
        assert_eq!(polygon_area(&polygon), 5000.0);
    }

    #[test]
    fn crops_region_from_page() {
        let page = page_with(&[]);
        let region = CardRegion {
            page_idx: 4,
            bbox: crate::core::geometry::Rect::new(850, 10, 100, 20),
            vertices: 4,
            area: 2000.0,
        };
        let crop = CardDetector::crop(&page, &region);
        assert_eq!(crop.dimensions(), (50, 20));
    }
}
