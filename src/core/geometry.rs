use imageproc::point::Point;
use serde::{Deserialize, Serialize};

/// Axis-aligned pixel rectangle, in page coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Shrinks the rectangle so it lies inside a `width` x `height` image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self {
            x,
            y,
            width: self.width.min(width - x),
            height: self.height.min(height - y),
        }
    }
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        twice += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    (twice.abs() as f64) / 2.0
}

/// Smallest pixel rectangle covering every vertex, inclusive of the edge pixels.
pub fn bounding_rect(points: &[Point<i32>]) -> Option<Rect> {
    let first = points.first()?;
    let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    let x0 = x0.max(0) as u32;
    let y0 = y0.max(0) as u32;
    let x1 = x1.max(0) as u32;
    let y1 = y1.max(0) as u32;
    Some(Rect::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn square(x: i32, y: i32, side: i32) -> Vec<Point<i32>> {
        vec![
            Point::new(x, y),
            Point::new(x + side, y),
            Point::new(x + side, y + side),
            Point::new(x, y + side),
        ]
    }

    #[test]
    fn computes_polygon_area() {
        assert_eq!(polygon_area(&square(5, 5, 10)), 100.0);
        assert_eq!(polygon_area(&square(0, 0, 10)[..2]), 0.0);
    }

    #[test]
    fn bounding_rect_includes_edge_pixels() {
        let rect = bounding_rect(&square(5, 7, 10)).unwrap();
        assert_eq!(rect, Rect::new(5, 7, 11, 11));
        assert!(bounding_rect(&[]).is_none());
    }

    #[test]
    fn clamps_to_image_bounds() {
        let rect = Rect::new(90, 10, 30, 200).clamp_to(100, 100);
        assert_eq!(rect, Rect::new(90, 10, 10, 90));
    }
}
