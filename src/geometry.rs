use image::RgbImage;

use crate::image_impl::{self, Point2f};
use crate::types::RectifyConfig;

/// Below this, two lines are treated as parallel (sine of the angle between them).
const PARALLEL_EPS: f32 = 1e-3;

/// A line segment; intersections treat it as an infinite line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub p1: Point2f,
    pub p2: Point2f,
}

impl Segment {
    pub fn new(p1: Point2f, p2: Point2f) -> Self {
        Self { p1, p2 }
    }

    pub fn length(&self) -> f32 {
        self.p1.distance(&self.p2)
    }

    pub fn midpoint(&self) -> Point2f {
        Point2f::new((self.p1.x + self.p2.x) / 2.0, (self.p1.y + self.p2.y) / 2.0)
    }

    /// Direction in degrees, folded into `[0, 180)`.
    pub fn angle_deg(&self) -> f32 {
        let a = (self.p2.y - self.p1.y).atan2(self.p2.x - self.p1.x).to_degrees();
        let folded = a.rem_euclid(180.0);
        if folded >= 180.0 { 0.0 } else { folded }
    }

    pub fn is_horizontal(&self) -> bool {
        let a = self.angle_deg();
        a < 30.0 || a > 150.0
    }

    pub fn is_vertical(&self) -> bool {
        let a = self.angle_deg();
        a > 60.0 && a < 120.0
    }

    /// Intersection of the two supporting lines; `None` if near-parallel.
    pub fn intersection(&self, other: &Segment) -> Option<Point2f> {
        let (x1, y1, x2, y2) = (self.p1.x, self.p1.y, self.p2.x, self.p2.y);
        let (x3, y3, x4, y4) = (other.p1.x, other.p1.y, other.p2.x, other.p2.y);

        let denom = (x1 - x2) * (y3 - y4) - (y1 - y2) * (x3 - x4);
        let scale = self.length() * other.length();
        if scale <= f32::EPSILON || (denom / scale).abs() < PARALLEL_EPS {
            return None;
        }

        let a = x1 * y2 - y1 * x2;
        let b = x3 * y4 - y3 * x4;
        let px = (a * (x3 - x4) - (x1 - x2) * b) / denom;
        let py = (a * (y3 - y4) - (y1 - y2) * b) / denom;
        Some(Point2f::new(px, py))
    }
}

/// Order as top-left, top-right, bottom-right, bottom-left.
///
/// Top-left has the smallest `x + y`, bottom-right the largest; top-right has
/// the smallest `y - x`, bottom-left the largest.
pub fn order_points(pts: &[Point2f; 4]) -> [Point2f; 4] {
    let sum = |p: &Point2f| p.x + p.y;
    let diff = |p: &Point2f| p.y - p.x;
    [
        pick(pts, sum, false),
        pick(pts, diff, false),
        pick(pts, sum, true),
        pick(pts, diff, true),
    ]
}

fn pick(pts: &[Point2f; 4], key: fn(&Point2f) -> f32, max: bool) -> Point2f {
    let mut best = pts[0];
    for p in &pts[1..] {
        if (max && key(p) > key(&best)) || (!max && key(p) < key(&best)) {
            best = *p;
        }
    }
    best
}

/// Destination `(width, height)` from the longer edge of each opposite pair.
pub fn destination_size(rect: &[Point2f; 4]) -> (u32, u32) {
    let [tl, tr, br, bl] = rect;
    let width = br.distance(bl).max(tr.distance(tl));
    let height = tr.distance(br).max(tl.distance(bl));
    (width as u32, height as u32)
}

fn corners_distinct(rect: &[Point2f; 4]) -> bool {
    for i in 0..4 {
        for j in (i + 1)..4 {
            if rect[i].distance(&rect[j]) < 1.0 {
                return false;
            }
        }
    }
    true
}

/// Whether a rectified output of `size` is plausible for a region of `region_size`.
pub fn output_size_ok(size: (u32, u32), region_size: (u32, u32), cfg: &RectifyConfig) -> bool {
    let max_w = ((region_size.0 as f32 * cfg.max_scale) as u32).min(cfg.max_side);
    let max_h = ((region_size.1 as f32 * cfg.max_scale) as u32).min(cfg.max_side);
    size.0 >= cfg.min_width.max(1)
        && size.1 >= cfg.min_height.max(1)
        && size.0 <= max_w
        && size.1 <= max_h
}

/// Perspective-unwarp the quadrilateral `corners` of `src` onto an upright rectangle.
///
/// `None` when the corners are degenerate or the output size is out of range.
pub fn four_point_warp(
    src: &RgbImage,
    corners: &[Point2f; 4],
    cfg: &RectifyConfig,
) -> Option<RgbImage> {
    let rect = order_points(corners);
    if !corners_distinct(&rect) {
        return None;
    }

    let (width, height) = destination_size(&rect);
    if !output_size_ok((width, height), src.dimensions(), cfg) {
        log::debug!(
            "rejecting rectified size {}x{} for region {}x{}",
            width,
            height,
            src.width(),
            src.height()
        );
        return None;
    }

    let pts_src = rect.map(|p| [p.x, p.y]);
    let (w, h) = ((width - 1) as f32, (height - 1) as f32);
    let pts_dst = [[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]];

    let m = image_impl::get_perspective_transform(&pts_src, &pts_dst)?;
    image_impl::warp_perspective(src, &m, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn p(x: f32, y: f32) -> Point2f {
        Point2f::new(x, y)
    }

    #[test]
    fn test_order_points() {
        let shuffled = [p(90.0, 42.0), p(5.0, 3.0), p(8.0, 40.0), p(95.0, 1.0)];
        let ordered = order_points(&shuffled);
        assert_eq!(ordered, [p(5.0, 3.0), p(95.0, 1.0), p(90.0, 42.0), p(8.0, 40.0)]);
    }

    #[test]
    fn test_destination_size_uses_longer_edges() {
        let rect = [p(0.0, 0.0), p(100.0, 0.0), p(90.0, 30.0), p(10.0, 25.0)];
        let (w, h) = destination_size(&rect);
        assert_eq!(w, 100);
        assert_eq!(h, 31);
    }

    #[test]
    fn test_segment_classification() {
        let h = Segment::new(p(0.0, 10.0), p(100.0, 14.0));
        let v = Segment::new(p(5.0, 0.0), p(8.0, 40.0));
        let diag = Segment::new(p(0.0, 0.0), p(10.0, 10.0));
        assert!(h.is_horizontal() && !h.is_vertical());
        assert!(v.is_vertical() && !v.is_horizontal());
        assert!(!diag.is_horizontal() && !diag.is_vertical());
        // Reversed direction folds to the same class.
        assert!(Segment::new(p(100.0, 14.0), p(0.0, 10.0)).is_horizontal());
    }

    #[test]
    fn test_intersection() {
        let h = Segment::new(p(0.0, 10.0), p(100.0, 10.0));
        let v = Segment::new(p(30.0, 0.0), p(30.0, 50.0));
        let x = h.intersection(&v).unwrap();
        assert!((x.x - 30.0).abs() < 1e-4 && (x.y - 10.0).abs() < 1e-4);

        let h2 = Segment::new(p(0.0, 20.0), p(100.0, 20.0));
        assert!(h.intersection(&h2).is_none());
    }

    #[test]
    fn test_four_point_warp_rejects_tiny_output() {
        let src = RgbImage::from_pixel(100, 40, Rgb([255, 255, 255]));
        let cfg = RectifyConfig::default();
        let tiny = [p(10.0, 10.0), p(15.0, 10.0), p(15.0, 14.0), p(10.0, 14.0)];
        assert!(four_point_warp(&src, &tiny, &cfg).is_none());

        let plate = [p(5.0, 5.0), p(95.0, 5.0), p(95.0, 35.0), p(5.0, 35.0)];
        let out = four_point_warp(&src, &plate, &cfg).unwrap();
        assert_eq!(out.dimensions(), (90, 30));
    }

    #[test]
    fn test_zero_minimums_still_reject_empty_output() {
        let cfg = RectifyConfig { min_width: 0, min_height: 0, ..RectifyConfig::default() };
        assert!(!output_size_ok((0, 12), (100, 40), &cfg));
        assert!(!output_size_ok((30, 0), (100, 40), &cfg));
        assert!(output_size_ok((1, 1), (100, 40), &cfg));
    }
}
