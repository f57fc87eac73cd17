//! Low-level pixel and matrix helpers on top of the `image` crate and nalgebra.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

pub type Matrix3x3 = [[f64; 3]; 3];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2f {
    pub x: f32,
    pub y: f32,
}

impl Point2f {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2f) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Bicubic (Catmull-Rom) resize by an integer factor.
pub fn upscale(img: &DynamicImage, factor: u32) -> DynamicImage {
    let factor = factor.max(1);
    img.resize_exact(img.width() * factor, img.height() * factor, FilterType::CatmullRom)
}

/// Pad a grayscale image with a constant black border `(top, bottom, left, right)`.
pub fn add_round_letterbox(img: &GrayImage, padding: (u32, u32, u32, u32)) -> GrayImage {
    let (width, height) = img.dimensions();
    let new_width = width + padding.2 + padding.3;
    let new_height = height + padding.0 + padding.1;

    let mut new_img = GrayImage::from_pixel(new_width, new_height, Luma([0]));
    for (x, y, pixel) in img.enumerate_pixels() {
        new_img.put_pixel(x + padding.2, y + padding.0, *pixel);
    }
    new_img
}

/// Solve the homography mapping `src_pts` onto `dst_pts`.
pub fn get_perspective_transform(
    src_pts: &[[f32; 2]; 4],
    dst_pts: &[[f32; 2]; 4],
) -> Option<Matrix3x3> {
    use nalgebra::DMatrix;

    // Fix h22 = 1 and solve the 8x8 system first.
    // Rows 0..4 constrain u, rows 4..8 constrain v.
    let mut a = DMatrix::<f64>::zeros(8, 8);
    let mut b = DMatrix::<f64>::zeros(8, 1);

    for i in 0..4 {
        let x = src_pts[i][0] as f64;
        let y = src_pts[i][1] as f64;
        let u = dst_pts[i][0] as f64;
        let v = dst_pts[i][1] as f64;

        a[(i, 0)] = x;
        a[(i, 1)] = y;
        a[(i, 2)] = 1.0;
        a[(i, 6)] = -u * x;
        a[(i, 7)] = -u * y;
        b[(i, 0)] = u;

        a[(i + 4, 3)] = x;
        a[(i + 4, 4)] = y;
        a[(i + 4, 5)] = 1.0;
        a[(i + 4, 6)] = -v * x;
        a[(i + 4, 7)] = -v * y;
        b[(i + 4, 0)] = v;
    }

    // Accept the LU solution only if it actually satisfies the system
    if let Some(sol) = a.clone().lu().solve(&b) {
        let residual = (&a * &sol - &b).norm();
        if residual < 1e-6 && sol.iter().all(|v| v.is_finite()) {
            return Some([
                [sol[(0, 0)], sol[(1, 0)], sol[(2, 0)]],
                [sol[(3, 0)], sol[(4, 0)], sol[(5, 0)]],
                [sol[(6, 0)], sol[(7, 0)], 1.0],
            ]);
        }
    }

    // Full 9-parameter system, null vector of A^T A.
    let mut a9 = DMatrix::<f64>::zeros(8, 9);
    for i in 0..4 {
        let x = src_pts[i][0] as f64;
        let y = src_pts[i][1] as f64;
        let u = dst_pts[i][0] as f64;
        let v = dst_pts[i][1] as f64;

        a9[(i, 0)] = x;
        a9[(i, 1)] = y;
        a9[(i, 2)] = 1.0;
        a9[(i, 6)] = -u * x;
        a9[(i, 7)] = -u * y;
        a9[(i, 8)] = -u;

        a9[(i + 4, 3)] = x;
        a9[(i + 4, 4)] = y;
        a9[(i + 4, 5)] = 1.0;
        a9[(i + 4, 6)] = -v * x;
        a9[(i + 4, 7)] = -v * y;
        a9[(i + 4, 8)] = -v;
    }

    // Smallest singular vector of A^T A
    let ata = a9.transpose() * &a9;
    let svd = ata.svd(true, false);
    let u = svd.u?;

    // Singular values are not guaranteed sorted.
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;
    let h = u.column(min_idx);
    // Normalize so h22 = 1
    if h[8].abs() < 1e-12 {
        return None;
    }

    Some([
        [h[0] / h[8], h[1] / h[8], h[2] / h[8]],
        [h[3] / h[8], h[4] / h[8], h[5] / h[8]],
        [h[6] / h[8], h[7] / h[8], 1.0],
    ])
}

pub fn invert_matrix_3x3(m: &Matrix3x3) -> Option<Matrix3x3> {
    use nalgebra::Matrix3;

    let mat = Matrix3::new(
        m[0][0], m[0][1], m[0][2],
        m[1][0], m[1][1], m[1][2],
        m[2][0], m[2][1], m[2][2],
    );

    let inv = mat.try_inverse()?;

    Some([
        [inv[(0, 0)], inv[(0, 1)], inv[(0, 2)]],
        [inv[(1, 0)], inv[(1, 1)], inv[(1, 2)]],
        [inv[(2, 0)], inv[(2, 1)], inv[(2, 2)]],
    ])
}

/// Warp `src` through `matrix` into a `width x height` image, bilinear sampling.
///
/// Output pixels that map outside the source stay black.
pub fn warp_perspective(
    src: &RgbImage,
    matrix: &Matrix3x3,
    width: u32,
    height: u32,
) -> Option<RgbImage> {
    // Map destination pixels back into the source
    let m_inv = invert_matrix_3x3(matrix)?;

    // Create output image
    let mut out_img: RgbImage = ImageBuffer::new(width, height);

    let (m00, m01, m02) = (m_inv[0][0], m_inv[0][1], m_inv[0][2]);
    let (m10, m11, m12) = (m_inv[1][0], m_inv[1][1], m_inv[1][2]);
    let (m20, m21, m22) = (m_inv[2][0], m_inv[2][1], m_inv[2][2]);
    let src_cols = src.width() as i32;
    let src_rows = src.height() as i32;

    for y in 0..height {
        // Pre-compute y-dependent terms
        let y_f = y as f64;
        let m01y = m01 * y_f;
        let m11y = m11 * y_f;
        let m21y = m21 * y_f;

        for x in 0..width {
            let x_f = x as f64;
            let w = m20 * x_f + m21y + m22;
            if w.abs() < 1e-12 {
                continue;
            }
            let src_x_f = (m00 * x_f + m01y + m02) / w;
            let src_y_f = (m10 * x_f + m11y + m12) / w;

            let x0 = src_x_f.floor() as i32;
            let y0 = src_y_f.floor() as i32;
            let x1 = x0 + 1;
            let y1 = y0 + 1;

            // Bilinear interpolation inside the source bounds
            if x0 >= 0 && x1 < src_cols && y0 >= 0 && y1 < src_rows {
                let fx = src_x_f - x0 as f64;
                let fy = src_y_f - y0 as f64;

                let p00 = src.get_pixel(x0 as u32, y0 as u32);
                let p10 = src.get_pixel(x1 as u32, y0 as u32);
                let p01 = src.get_pixel(x0 as u32, y1 as u32);
                let p11 = src.get_pixel(x1 as u32, y1 as u32);

                let mut rgb = [0u8; 3];
                for (c, value) in rgb.iter_mut().enumerate() {
                    let v = (1.0 - fx) * (1.0 - fy) * p00[c] as f64
                        + fx * (1.0 - fy) * p10[c] as f64
                        + (1.0 - fx) * fy * p01[c] as f64
                        + fx * fy * p11[c] as f64;
                    *value = v.round().clamp(0.0, 255.0) as u8;
                }
                out_img.put_pixel(x, y, Rgb(rgb));
            } else if x0 >= 0 && x0 < src_cols && y0 >= 0 && y0 < src_rows {
                // Nearest neighbour on the last row/column.
                out_img.put_pixel(x, y, *src.get_pixel(x0 as u32, y0 as u32));
            }
        }
    }

    Some(out_img)
}

/// Minimum-area enclosing rectangle via rotating calipers.
///
/// Returns `(center, (width, height), angle_degrees)`.
pub fn min_area_rect(contour: &[Point2f]) -> Option<(Point2f, (f32, f32), f32)> {
    if contour.len() < 3 {
        return None;
    }

    let hull = compute_convex_hull(contour);
    if hull.len() < 3 {
        return None;
    }

    let mut min_area = f32::MAX;
    let mut best_rect = None;

    let n = hull.len();
    for i in 0..n {
        let p1 = hull[i];
        let p2 = hull[(i + 1) % n];

        let edge_x = p2.x - p1.x;
        let edge_y = p2.y - p1.y;
        let edge_len = (edge_x * edge_x + edge_y * edge_y).sqrt();
        if edge_len < 1e-6 {
            continue;
        }

        let ux = edge_x / edge_len;
        let uy = edge_y / edge_len;
        let vx = -uy;
        let vy = ux;

        let mut min_u = f32::MAX;
        let mut max_u = f32::MIN;
        let mut min_v = f32::MAX;
        let mut max_v = f32::MIN;

        for pt in &hull {
            let u = pt.x * ux + pt.y * uy;
            let v = pt.x * vx + pt.y * vy;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let width = max_u - min_u;
        let height = max_v - min_v;
        let area = width * height;

        if area < min_area {
            min_area = area;

            let center_u = (min_u + max_u) / 2.0;
            let center_v = (min_v + max_v) / 2.0;
            let center_x = center_u * ux + center_v * vx;
            let center_y = center_u * uy + center_v * vy;
            let angle = uy.atan2(ux).to_degrees();

            best_rect = Some((Point2f::new(center_x, center_y), (width, height), angle));
        }
    }

    best_rect
}

/// Convex hull by Graham scan, counter-clockwise in image coordinates.
fn compute_convex_hull(points: &[Point2f]) -> Vec<Point2f> {
    if points.len() <= 3 {
        return points.to_vec();
    }

    let mut start_idx = 0;
    for (i, pt) in points.iter().enumerate().skip(1) {
        let start = points[start_idx];
        if pt.y < start.y || (pt.y == start.y && pt.x < start.x) {
            start_idx = i;
        }
    }

    let start = points[start_idx];
    let mut sorted: Vec<Point2f> = points.to_vec();
    sorted.swap(0, start_idx);

    sorted[1..].sort_by(|a, b| {
        let angle_a = (a.y - start.y).atan2(a.x - start.x);
        let angle_b = (b.y - start.y).atan2(b.x - start.x);
        angle_a
            .partial_cmp(&angle_b)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                start
                    .distance(a)
                    .partial_cmp(&start.distance(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });

    let mut hull: Vec<Point2f> = Vec::with_capacity(sorted.len());
    for pt in sorted {
        while hull.len() >= 2 {
            let p1 = hull[hull.len() - 2];
            let p2 = hull[hull.len() - 1];
            let cross = (p2.x - p1.x) * (pt.y - p1.y) - (p2.y - p1.y) * (pt.x - p1.x);
            if cross <= 0.0 {
                hull.pop();
            } else {
                break;
            }
        }
        hull.push(pt);
    }

    hull
}

/// Corners of a rotated rectangle.
pub fn box_points(center: Point2f, size: (f32, f32), angle: f32) -> [Point2f; 4] {
    let angle_rad = angle.to_radians();
    let cos_a = angle_rad.cos();
    let sin_a = angle_rad.sin();

    let w = size.0 / 2.0;
    let h = size.1 / 2.0;

    [(-w, -h), (w, -h), (w, h), (-w, h)].map(|(dx, dy)| {
        Point2f::new(
            center.x + dx * cos_a - dy * sin_a,
            center.y + dx * sin_a + dy * cos_a,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perspective_identity() {
        let pts = [[0.0, 0.0], [10.0, 0.0], [10.0, 5.0], [0.0, 5.0]];
        let m = get_perspective_transform(&pts, &pts).unwrap();
        for (i, row) in m.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((v - expected).abs() < 1e-9, "m[{i}][{j}] = {v}");
            }
        }
    }

    #[test]
    fn test_warp_translation_copies_pixels() {
        let mut src = RgbImage::new(20, 20);
        src.put_pixel(12, 7, Rgb([200, 10, 10]));
        let src_pts = [[10.0, 5.0], [15.0, 5.0], [15.0, 10.0], [10.0, 10.0]];
        let dst_pts = [[0.0, 0.0], [5.0, 0.0], [5.0, 5.0], [0.0, 5.0]];
        let m = get_perspective_transform(&src_pts, &dst_pts).unwrap();
        let out = warp_perspective(&src, &m, 6, 6).unwrap();
        assert_eq!(out.get_pixel(2, 2), &Rgb([200, 10, 10]));
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_min_area_rect_axis_aligned() {
        let pts = [
            Point2f::new(0.0, 0.0),
            Point2f::new(40.0, 0.0),
            Point2f::new(40.0, 10.0),
            Point2f::new(0.0, 10.0),
            Point2f::new(20.0, 5.0),
        ];
        let (center, (w, h), _) = min_area_rect(&pts).unwrap();
        assert!((center.x - 20.0).abs() < 1e-3 && (center.y - 5.0).abs() < 1e-3);
        let (long, short) = if w > h { (w, h) } else { (h, w) };
        assert!((long - 40.0).abs() < 1e-3 && (short - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_letterbox_offsets_content() {
        let img = GrayImage::from_pixel(4, 3, Luma([255]));
        let padded = add_round_letterbox(&img, (2, 2, 5, 5));
        assert_eq!(padded.dimensions(), (14, 7));
        assert_eq!(padded.get_pixel(5, 2)[0], 255);
        assert_eq!(padded.get_pixel(4, 2)[0], 0);
    }
}
