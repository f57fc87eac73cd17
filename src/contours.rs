// Contour-based plate outline search.
// Thresholds the padded region two ways, fuses characters into one blob with a
// closing, then scores polygon approximations of the largest outer contours.

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::morphology::close;
use imageproc::point::Point;

use crate::image_impl::{add_round_letterbox, box_points, min_area_rect, Point2f};
use crate::preprocess::otsu_binarize;
use crate::types::RectifyConfig;

/// Polygon approximation that survived scoring.
#[derive(Debug, Clone)]
pub struct PolygonCandidate {
    pub points: Vec<Point2f>,
    pub score: f32,
}

/// Find the plate's four corners, in unpadded region coordinates.
pub fn contour_strategy(gray: &GrayImage, cfg: &RectifyConfig) -> Option<[Point2f; 4]> {
    let pad = cfg.padding;
    let padded = add_round_letterbox(gray, (pad, pad, pad, pad));

    let binaries = [
        ("otsu", otsu_binarize(&padded)),
        (
            "adaptive",
            adaptive_mean_threshold(&padded, cfg.adaptive_block_radius, cfg.adaptive_c),
        ),
    ];

    // Keep the best polygon across both thresholds
    let mut best: Option<PolygonCandidate> = None;
    for (name, binary) in &binaries {
        let closed = close(binary, Norm::LInf, cfg.close_radius);
        if let Some(candidate) = best_polygon(&closed, cfg) {
            log::debug!("contour[{}]: best polygon score {:.3}", name, candidate.score);
            if best.as_ref().map_or(true, |b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }
    }

    let best = best?;
    if best.score < cfg.min_polygon_score {
        log::debug!("contour: best score {:.3} below minimum", best.score);
        return None;
    }

    // Collapse extra vertices to the minimum-area rectangle
    let corners = if best.points.len() > 4 {
        let (center, size, angle) = min_area_rect(&best.points)?;
        box_points(center, size, angle)
    } else {
        [best.points[0], best.points[1], best.points[2], best.points[3]]
    };

    // Back to region coordinates
    let offset = pad as f32;
    Some(corners.map(|p| Point2f::new(p.x - offset, p.y - offset)))
}

/// Highest-scoring polygon among the largest outer contours of `binary`.
fn best_polygon(binary: &GrayImage, cfg: &RectifyConfig) -> Option<PolygonCandidate> {
    let (width, height) = binary.dimensions();
    let image_area = width as f64 * height as f64;

    let mut outer: Vec<(f64, Vec<Point<i32>>)> = find_contours::<i32>(binary)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter(|c| c.points.len() >= 4 && !touches_border(&c.points, width, height))
        .map(|c| (shoelace_area(&c.points), c.points))
        .collect();
    // Largest first
    outer.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    outer.truncate(cfg.max_contours);

    let mut best: Option<PolygonCandidate> = None;
    for (_, points) in &outer {
        let perimeter = arc_length(points, true);
        if perimeter <= 0.0 {
            continue;
        }
        for &factor in cfg.epsilon_factors.iter().filter(|f| **f > 0.0) {
            let mut approx = approximate_polygon_dp(points, factor * perimeter, true);
            // Drop the repeated closing point
            if approx.len() > 1 && approx.first() == approx.last() {
                approx.pop();
            }
            if approx.len() < 4 {
                continue;
            }

            let score = polygon_score(&approx, image_area, &cfg.plate_ratios);
            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(PolygonCandidate {
                    points: approx.iter().map(|p| Point2f::new(p.x as f32, p.y as f32)).collect(),
                    score,
                });
            }
        }
    }
    best
}

/// Weighted closeness to a four-sided, large, plate-shaped polygon.
pub fn polygon_score(poly: &[Point<i32>], image_area: f64, plate_ratios: &[f32]) -> f32 {
    let vertex_score = 1.0 / (1.0 + (poly.len() as f32 - 4.0).abs());

    let area_score = if image_area > 0.0 {
        (shoelace_area(poly) / image_area).clamp(0.0, 1.0) as f32
    } else {
        0.0
    };

    let pts: Vec<Point2f> = poly.iter().map(|p| Point2f::new(p.x as f32, p.y as f32)).collect();
    let aspect_score = match min_area_rect(&pts) {
        Some((_, (w, h), _)) if w.min(h) > 0.0 => {
            let ratio = w.max(h) / w.min(h);
            plate_ratios
                .iter()
                .filter(|t| **t > 0.0)
                .map(|t| 1.0 / (1.0 + (ratio - t).abs() / t))
                .fold(0.0f32, f32::max)
        }
        _ => 0.0,
    };

    0.4 * vertex_score + 0.3 * area_score + 0.3 * aspect_score
}

/// Absolute polygon area by the shoelace formula.
pub fn shoelace_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0f64;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        sum += a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64;
    }
    (sum / 2.0).abs()
}

// Contours reaching the padded frame come from the padding itself.
fn touches_border(points: &[Point<i32>], width: u32, height: u32) -> bool {
    let (max_x, max_y) = (width as i32 - 1, height as i32 - 1);
    points
        .iter()
        .any(|p| p.x <= 0 || p.y <= 0 || p.x >= max_x || p.y >= max_y)
}

/// Local-mean threshold: white where the pixel exceeds its neighbourhood mean minus `c`.
pub fn adaptive_mean_threshold(gray: &GrayImage, block_radius: u32, c: i32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let stride = width as usize + 1;

    // Summed-area table with a zero row and column.
    let mut integral = vec![0u64; stride * (height as usize + 1)];
    for y in 0..height as usize {
        let mut row_sum = 0u64;
        for x in 0..width as usize {
            row_sum += gray.get_pixel(x as u32, y as u32)[0] as u64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }

    let r = block_radius as i64;
    GrayImage::from_fn(width, height, |x, y| {
        let x0 = (x as i64 - r).max(0) as usize;
        let y0 = (y as i64 - r).max(0) as usize;
        let x1 = (x as i64 + r + 1).min(width as i64) as usize;
        let y1 = (y as i64 + r + 1).min(height as i64) as usize;

        let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
            - integral[y0 * stride + x1]
            - integral[y1 * stride + x0];
        let count = ((x1 - x0) * (y1 - y0)).max(1) as u64;
        let mean = (sum / count) as i32;

        let value = gray.get_pixel(x, y)[0] as i32;
        if value > mean - c { Luma([255]) } else { Luma([0]) }
    })
}
