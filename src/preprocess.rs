use image::{DynamicImage, GrayImage, Luma, RgbImage};
use imageproc::contrast::otsu_level;

use crate::image_impl::upscale;
use crate::rectify::{GeometricRectifier, Rectified};
use crate::types::{RectifyMethod, Region, Variant, VariantConfig, VariantMethod};

/// Builds the ordered set of recognizer inputs for one region.
#[derive(Clone, Debug, Default)]
pub struct VariantGenerator {
    rectifier: GeometricRectifier,
    cfg: VariantConfig,
}

impl VariantGenerator {
    pub fn new(rectifier: GeometricRectifier, cfg: VariantConfig) -> Self {
        Self { rectifier, cfg }
    }

    pub fn rectifier(&self) -> &GeometricRectifier {
        &self.rectifier
    }

    /// Variants in priority order. Rectified ones come first and exist only
    /// when a strategy succeeded.
    pub fn generate(&self, region: &Region, apply_rectification: bool) -> Vec<Variant> {
        let rectified = if apply_rectification && self.rectifier.config().enabled {
            self.rectifier.rectify(region)
        } else {
            Rectified { image: region.crop.clone(), method: RectifyMethod::None }
        };
        self.generate_from(region, &rectified)
    }

    pub fn generate_from(&self, region: &Region, rectified: &Rectified) -> Vec<Variant> {
        let mut variants = Vec::with_capacity(6);

        let (gray, gray_upscaled) = self.base_gray(&image::imageops::grayscale(&region.crop));

        let rectified_base = if rectified.method.succeeded() {
            let (color, upscaled) = self.base_color(&rectified.image);
            let gray = image::imageops::grayscale(&color);
            Some((color, gray, upscaled))
        } else {
            None
        };

        if let Some((color, rect_gray, upscaled)) = &rectified_base {
            variants.push(Variant::new(
                DynamicImage::ImageLuma8(rect_gray.clone()),
                VariantMethod::RectifiedGray,
                *upscaled,
            ));
            variants.push(Variant::new(
                DynamicImage::ImageRgb8(color.clone()),
                VariantMethod::RectifiedColor,
                *upscaled,
            ));
        }

        variants.push(Variant::new(
            DynamicImage::ImageLuma8(gray.clone()),
            VariantMethod::Gray,
            gray_upscaled,
        ));
        variants.push(Variant::new(
            DynamicImage::ImageLuma8(clahe(&gray, self.cfg.clahe_clip_limit, self.cfg.clahe_tiles)),
            VariantMethod::GrayClahe,
            gray_upscaled,
        ));

        if let Some((_, rect_gray, upscaled)) = &rectified_base {
            variants.push(Variant::new(
                DynamicImage::ImageLuma8(otsu_binarize(rect_gray)),
                VariantMethod::RectifiedBinary,
                *upscaled,
            ));
        }

        variants.push(Variant::new(
            DynamicImage::ImageLuma8(otsu_binarize(&gray)),
            VariantMethod::Binary,
            gray_upscaled,
        ));

        log::debug!(
            "generated {} variants (rectify: {})",
            variants.len(),
            rectified.method.as_str()
        );
        variants
    }

    fn needs_upscale(&self, width: u32, height: u32) -> bool {
        self.cfg.upscale_factor > 1 && width.min(height) < self.cfg.upscale_min_side
    }

    fn base_gray(&self, gray: &GrayImage) -> (GrayImage, bool) {
        if self.needs_upscale(gray.width(), gray.height()) {
            let img = upscale(&DynamicImage::ImageLuma8(gray.clone()), self.cfg.upscale_factor);
            (img.to_luma8(), true)
        } else {
            (gray.clone(), false)
        }
    }

    fn base_color(&self, color: &RgbImage) -> (RgbImage, bool) {
        if self.needs_upscale(color.width(), color.height()) {
            let img = upscale(&DynamicImage::ImageRgb8(color.clone()), self.cfg.upscale_factor);
            (img.to_rgb8(), true)
        } else {
            (color.clone(), false)
        }
    }
}

/// Global Otsu threshold; pixels above the level become white.
pub fn otsu_binarize(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] > level { Luma([255]) } else { Luma([0]) }
    })
}

/// Contrast-limited adaptive histogram equalization.
///
/// Each tile gets a clipped, equalized lookup table; the excess above the clip
/// limit is spread back over all bins. Pixels blend the tables of the four
/// nearest tile centers bilinearly.
pub fn clahe(gray: &GrayImage, clip_limit: f32, tiles: (u32, u32)) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }
    let tiles_x = tiles.0.clamp(1, width);
    let tiles_y = tiles.1.clamp(1, height);
    let tile_w = width.div_ceil(tiles_x);
    let tile_h = height.div_ceil(tiles_y);

    // Tiles past the right or bottom edge read a mirrored border, so every
    // tile histogram covers exactly tile_w * tile_h samples.
    let mut luts = vec![[0u8; 256]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;

            let mut hist = [0u32; 256];
            for y in y0..y0 + tile_h {
                let sy = reflect(y, height);
                for x in x0..x0 + tile_w {
                    hist[gray.get_pixel(reflect(x, width), sy)[0] as usize] += 1;
                }
            }
            luts[(ty * tiles_x + tx) as usize] = tile_lut(&mut hist, tile_w * tile_h, clip_limit);
        }
    }

    // Tile index pair and weight of the second tile along one axis.
    let neighbours = |pos: u32, tile: u32, count: u32| -> (u32, u32, f32) {
        let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
        if f <= 0.0 {
            (0, 0, 0.0)
        } else if f >= (count - 1) as f32 {
            (count - 1, count - 1, 0.0)
        } else {
            let i = f.floor() as u32;
            (i, i + 1, f - i as f32)
        }
    };

    GrayImage::from_fn(width, height, |x, y| {
        let v = gray.get_pixel(x, y)[0] as usize;
        let (xa, xb, wx) = neighbours(x, tile_w, tiles_x);
        let (ya, yb, wy) = neighbours(y, tile_h, tiles_y);
        let at = |tx: u32, ty: u32| luts[(ty * tiles_x + tx) as usize][v] as f32;

        let top = at(xa, ya) * (1.0 - wx) + at(xb, ya) * wx;
        let bottom = at(xa, yb) * (1.0 - wx) + at(xb, yb) * wx;
        let value = top * (1.0 - wy) + bottom * wy;
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

/// Mirror `i` about the last index of an axis of length `n` (edge pixel not repeated).
fn reflect(i: u32, n: u32) -> u32 {
    if i < n {
        i
    } else {
        (2 * (n - 1)).saturating_sub(i) % n
    }
}

fn tile_lut(hist: &mut [u32; 256], count: u32, clip_limit: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if count == 0 {
        return lut;
    }

    if clip_limit > 0.0 {
        let clip = ((clip_limit * count as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in hist.iter_mut() {
            if *bin > clip {
                excess += *bin - clip;
                *bin = clip;
            }
        }

        let batch = excess / 256;
        let mut residual = excess % 256;
        for bin in hist.iter_mut() {
            *bin += batch;
        }
        if residual > 0 {
            let step = (256 / residual).max(1) as usize;
            for bin in hist.iter_mut().step_by(step) {
                if residual == 0 {
                    break;
                }
                *bin += 1;
                residual -= 1;
            }
        }
    }

    let scale = 255.0 / count as f32;
    let mut cdf = 0u32;
    for (i, bin) in hist.iter().enumerate() {
        cdf += bin;
        lut[i] = (cdf as f32 * scale).round().min(255.0) as u8;
    }
    lut
}
