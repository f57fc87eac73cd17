use image::{GrayImage, RgbImage};
use imageproc::corners::corners_fast9;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};

use crate::contours::contour_strategy;
use crate::geometry::{four_point_warp, Segment};
use crate::image_impl::Point2f;
use crate::types::{RectifyConfig, RectifyMethod, Region};

/// Outcome of rectification: the warped plate, or the untouched crop with [`RectifyMethod::None`].
#[derive(Clone, Debug)]
pub struct Rectified {
    pub image: RgbImage,
    pub method: RectifyMethod,
}

type Strategy = fn(&GrayImage, &RectifyConfig) -> Option<[Point2f; 4]>;

/// Perspective correction with three ordered fallback strategies.
#[derive(Clone, Debug, Default)]
pub struct GeometricRectifier {
    cfg: RectifyConfig,
}

impl GeometricRectifier {
    pub fn new(cfg: RectifyConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &RectifyConfig {
        &self.cfg
    }

    pub fn rectify(&self, region: &Region) -> Rectified {
        let crop = &region.crop;
        let (w, h) = crop.dimensions();
        if w < self.cfg.min_width || h < self.cfg.min_height {
            log::debug!("region {}x{} too small to rectify", w, h);
            return Rectified { image: crop.clone(), method: RectifyMethod::None };
        }

        let gray = image::imageops::grayscale(crop);
        let strategies: [(RectifyMethod, Strategy); 3] = [
            (RectifyMethod::Edge, edge_strategy),
            (RectifyMethod::Corner, corner_strategy),
            (RectifyMethod::Contour, contour_strategy),
        ];

        for (method, find_corners) in strategies {
            let Some(corners) = find_corners(&gray, &self.cfg) else {
                log::debug!("rectify[{}]: no quadrilateral", method.as_str());
                continue;
            };
            match four_point_warp(crop, &corners, &self.cfg) {
                Some(image) => {
                    log::debug!(
                        "rectify[{}]: warped {}x{} -> {}x{}",
                        method.as_str(),
                        w,
                        h,
                        image.width(),
                        image.height()
                    );
                    return Rectified { image, method };
                }
                None => log::debug!("rectify[{}]: corners rejected", method.as_str()),
            }
        }

        Rectified { image: crop.clone(), method: RectifyMethod::None }
    }
}

/// Corners from the outermost horizontal and vertical Hough lines.
pub fn edge_strategy(gray: &GrayImage, cfg: &RectifyConfig) -> Option<[Point2f; 4]> {
    let (w, h) = gray.dimensions();
    let blurred = gaussian_blur_f32(gray, cfg.blur_sigma);
    let vote_threshold =
        ((w.min(h) as f32 * cfg.hough_vote_ratio) as u32).max(cfg.hough_min_votes);

    for &(low, high) in &cfg.canny_thresholds {
        let edges = canny(&blurred, low, high);
        let options = LineDetectionOptions {
            vote_threshold,
            suppression_radius: cfg.hough_suppression_radius,
        };
        let segments: Vec<Segment> = detect_lines(&edges, options)
            .iter()
            .filter_map(|line| polar_to_segment(line, w as f32, h as f32))
            .collect();

        if let Some(corners) = corners_from_segments(&segments, (w, h), cfg.corner_margin) {
            return Some(corners);
        }
        log::debug!(
            "edge: canny({}, {}) gave {} usable lines",
            low,
            high,
            segments.len()
        );
    }
    None
}

/// Clip the polar line `x cos(t) + y sin(t) = r` to the image rectangle.
fn polar_to_segment(line: &PolarLine, w: f32, h: f32) -> Option<Segment> {
    let theta = (line.angle_in_degrees as f32).to_radians();
    let (sin, cos) = theta.sin_cos();
    let origin = (line.r * cos, line.r * sin);
    let dir = (-sin, cos);

    let mut t0 = f32::NEG_INFINITY;
    let mut t1 = f32::INFINITY;
    for (p, d, max) in [(origin.0, dir.0, w - 1.0), (origin.1, dir.1, h - 1.0)] {
        if d.abs() < 1e-6 {
            if p < 0.0 || p > max {
                return None;
            }
        } else {
            let a = -p / d;
            let b = (max - p) / d;
            t0 = t0.max(a.min(b));
            t1 = t1.min(a.max(b));
        }
    }
    if t1 - t0 < 1.0 {
        return None;
    }

    Some(Segment::new(
        Point2f::new(origin.0 + t0 * dir.0, origin.1 + t0 * dir.1),
        Point2f::new(origin.0 + t1 * dir.0, origin.1 + t1 * dir.1),
    ))
}

/// Intersect the extreme top/bottom horizontals with the extreme left/right verticals.
pub fn corners_from_segments(
    segments: &[Segment],
    size: (u32, u32),
    margin: f32,
) -> Option<[Point2f; 4]> {
    let horizontal: Vec<&Segment> = segments.iter().filter(|s| s.is_horizontal()).collect();
    let vertical: Vec<&Segment> = segments.iter().filter(|s| s.is_vertical()).collect();
    if horizontal.len() < 2 || vertical.len() < 2 {
        return None;
    }

    let mid_y = |s: &Segment| s.midpoint().y;
    let mid_x = |s: &Segment| s.midpoint().x;

    let top = extreme(&horizontal, mid_y, false);
    let bottom = extreme(&horizontal, mid_y, true);
    let left = extreme(&vertical, mid_x, false);
    let right = extreme(&vertical, mid_x, true);

    let corners = [
        top.intersection(&left)?,
        top.intersection(&right)?,
        bottom.intersection(&right)?,
        bottom.intersection(&left)?,
    ];

    let (w, h) = (size.0 as f32, size.1 as f32);
    let (mx, my) = (w * margin, h * margin);
    let inside = |p: &Point2f| p.x >= -mx && p.x <= w + mx && p.y >= -my && p.y <= h + my;
    if corners.iter().all(inside) {
        Some(corners)
    } else {
        None
    }
}

fn extreme(lines: &[&Segment], key: fn(&Segment) -> f32, max: bool) -> Segment {
    let mut best = *lines[0];
    for &s in &lines[1..] {
        if (max && key(s) > key(&best)) || (!max && key(s) < key(&best)) {
            best = *s;
        }
    }
    best
}

/// The four strong interest points farthest from the region center.
pub fn corner_strategy(gray: &GrayImage, cfg: &RectifyConfig) -> Option<[Point2f; 4]> {
    let (w, h) = gray.dimensions();
    let mut corners = corners_fast9(gray, cfg.fast_threshold);
    if corners.len() < 4 {
        return None;
    }
    corners.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    corners.truncate(cfg.max_corners);

    let center = Point2f::new(w as f32 / 2.0, h as f32 / 2.0);
    let mut points: Vec<Point2f> = corners
        .iter()
        .map(|c| Point2f::new(c.x as f32, c.y as f32))
        .collect();
    points.sort_by(|a, b| {
        b.distance(&center)
            .partial_cmp(&a.distance(&center))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Some([points[0], points[1], points[2], points[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BBox;
    use image::{Luma, Rgb};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn p(x: f32, y: f32) -> Point2f {
        Point2f::new(x, y)
    }

    fn plate_region() -> Region {
        let mut img = RgbImage::from_pixel(200, 80, Rgb([40, 40, 40]));
        draw_filled_rect_mut(&mut img, Rect::at(20, 15).of_size(160, 50), Rgb([250, 250, 250]));
        Region::new(img, BBox::new(0, 0, 199, 79))
    }

    #[test]
    fn test_rectify_plate_on_background() {
        let rectifier = GeometricRectifier::default();
        let out = rectifier.rectify(&plate_region());
        assert!(out.method.succeeded(), "no strategy succeeded");
        let (w, h) = out.image.dimensions();
        assert!((150..=170).contains(&w), "width {w}");
        assert!((42..=58).contains(&h), "height {h}");
    }

    #[test]
    fn test_rectify_blank_falls_back_to_none() {
        let region = Region::new(RgbImage::new(100, 40), BBox::new(0, 0, 99, 39));
        let out = GeometricRectifier::default().rectify(&region);
        assert_eq!(out.method, RectifyMethod::None);
        assert_eq!(out.image, region.crop);
    }

    #[test]
    fn test_rectify_tiny_region_is_untouched() {
        let region = Region::new(RgbImage::from_pixel(8, 4, Rgb([1, 2, 3])), BBox::new(0, 0, 7, 3));
        let out = GeometricRectifier::default().rectify(&region);
        assert_eq!(out.method, RectifyMethod::None);
    }

    #[test]
    fn test_corners_from_segments_picks_extremes() {
        let segments = [
            Segment::new(p(0.0, 10.0), p(199.0, 12.0)),
            Segment::new(p(0.0, 40.0), p(199.0, 40.0)),
            Segment::new(p(0.0, 70.0), p(199.0, 68.0)),
            Segment::new(p(15.0, 0.0), p(17.0, 79.0)),
            Segment::new(p(100.0, 0.0), p(100.0, 79.0)),
            Segment::new(p(185.0, 0.0), p(183.0, 79.0)),
        ];
        let corners = corners_from_segments(&segments, (200, 80), 0.25).unwrap();
        assert!((corners[0].x - 15.25).abs() < 1.0 && (corners[0].y - 10.2).abs() < 1.0);
        assert!((corners[2].x - 183.2).abs() < 1.0 && (corners[2].y - 68.2).abs() < 1.0);
    }

    #[test]
    fn test_corners_need_two_of_each_orientation() {
        let segments = [
            Segment::new(p(0.0, 10.0), p(199.0, 10.0)),
            Segment::new(p(0.0, 70.0), p(199.0, 70.0)),
            Segment::new(p(15.0, 0.0), p(15.0, 79.0)),
        ];
        assert!(corners_from_segments(&segments, (200, 80), 0.25).is_none());
    }

    #[test]
    fn test_polar_line_clipping() {
        let horizontal = PolarLine { r: 20.0, angle_in_degrees: 90 };
        let seg = polar_to_segment(&horizontal, 100.0, 50.0).unwrap();
        assert!((seg.p1.y - 20.0).abs() < 1e-3 && (seg.p2.y - 20.0).abs() < 1e-3);
        assert!((seg.length() - 99.0).abs() < 1e-2);

        let outside = PolarLine { r: 80.0, angle_in_degrees: 90 };
        assert!(polar_to_segment(&outside, 100.0, 50.0).is_none());
    }

    /// Four bright 8x8 blobs whose outer corners sit symmetric about the center.
    fn blob_image() -> RgbImage {
        let mut img = RgbImage::new(120, 60);
        for (x, y) in [(10, 8), (103, 8), (103, 45), (10, 45)] {
            draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(8, 8), Rgb([255, 255, 255]));
        }
        img
    }

    #[test]
    fn test_corner_strategy_takes_farthest_points() {
        let gray = image::imageops::grayscale(&blob_image());
        let corners = corner_strategy(&gray, &RectifyConfig::default()).unwrap();

        let expected = [p(10.0, 8.0), p(110.0, 8.0), p(110.0, 52.0), p(10.0, 52.0)];
        for want in expected {
            assert!(
                corners.iter().any(|c| c.distance(&want) < 1.5),
                "no corner near ({}, {}): {:?}",
                want.x,
                want.y,
                corners
            );
        }
    }

    #[test]
    fn test_rectify_falls_back_to_corner_strategy() {
        let cfg = RectifyConfig { hough_min_votes: 10_000, ..RectifyConfig::default() };
        let region = Region::new(blob_image(), BBox::new(0, 0, 119, 59));
        let out = GeometricRectifier::new(cfg).rectify(&region);
        assert_eq!(out.method, RectifyMethod::Corner);
        assert_eq!(out.image.dimensions(), (100, 44));
    }

    #[test]
    fn test_corner_strategy_on_blank_image() {
        let gray = GrayImage::from_pixel(60, 30, Luma([128]));
        assert!(corner_strategy(&gray, &RectifyConfig::default()).is_none());
    }
}
