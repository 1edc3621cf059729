use image::RgbaImage;
use std::collections::VecDeque;

use crate::error::ConfigError;
use crate::math::luma;

/// Mouth rectangle in photo pixels, centre plus full size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouthRegion {
    pub cx: f32,
    pub cy: f32,
    pub width: f32,
    pub height: f32,
}

const DEFAULT_CENTRE: (f32, f32) = (0.5, 0.71);
const DEFAULT_SIZE: (f32, f32) = (0.18, 0.12);

const MIN_DARK_SAMPLES: usize = 20;
const DARK_PERCENTILE: f32 = 0.10;
const WIDEN: f32 = 1.2;
const HEIGHTEN: f32 = 1.5;

impl MouthRegion {
    /// Hardcoded default placement, as fractions of the photo.
    pub fn default_for(width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            cx: w * DEFAULT_CENTRE.0,
            cy: h * DEFAULT_CENTRE.1,
            width: w * DEFAULT_SIZE.0,
            height: h * DEFAULT_SIZE.1,
        }
    }

    /// Parse `cx,cy,w,h` in pixels.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let parts: Vec<f32> = raw
            .split(',')
            .map(|p| p.trim().parse::<f32>())
            .collect::<Result<_, _>>()
            .map_err(|e| ConfigError::Invalid(format!("mouth region '{raw}': {e}")))?;
        let [cx, cy, width, height] = parts.as_slice() else {
            return Err(ConfigError::Invalid(format!(
                "mouth region '{raw}': expected cx,cy,w,h"
            )));
        };
        if *width <= 0.0 || *height <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "mouth region '{raw}': size must be positive"
            )));
        }
        Ok(Self {
            cx: *cx,
            cy: *cy,
            width: *width,
            height: *height,
        })
    }

    pub fn half_extents(&self) -> (f32, f32) {
        (self.width * 0.5, self.height * 0.5)
    }

    /// Pixel rows and columns touched by the warp, clipped to the image.
    pub fn pixel_bounds(&self, img_w: u32, img_h: u32) -> Option<(usize, usize, usize, usize)> {
        let (rx, ry) = self.half_extents();
        if rx <= 0.0 || ry <= 0.0 || !self.cx.is_finite() || !self.cy.is_finite() {
            return None;
        }
        let x0 = (self.cx - rx).floor().max(0.0) as usize;
        let y0 = (self.cy - ry).floor().max(0.0) as usize;
        let x1 = ((self.cx + rx).ceil().max(0.0) as usize).min(img_w as usize);
        let y1 = ((self.cy + ry).ceil().max(0.0) as usize).min(img_h as usize);
        (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
    }
}

/// Find the darkest blob in the lower part of a face photo.
///
/// Samples a strided grid over the lower band, marks samples at or under the
/// 10th luminance percentile (and under the median) as dark and takes the
/// largest 4-connected dark component that does not touch the band's sides
/// or bottom (that is the backdrop). Returns `None` when too few dark samples
/// exist.
pub fn detect_mouth_region(img: &RgbaImage) -> Option<MouthRegion> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    let stride = (w.min(h) / 80).max(2);
    let y_start = (h as f32 * 0.45) as u32;
    let x_start = (w as f32 * 0.1) as u32;
    let x_end = (w as f32 * 0.9) as u32;

    let xs: Vec<u32> = (x_start..x_end).step_by(stride as usize).collect();
    let ys: Vec<u32> = (y_start..h).step_by(stride as usize).collect();
    let (gw, gh) = (xs.len(), ys.len());
    if gw == 0 || gh == 0 {
        return None;
    }

    let grid: Vec<f32> = ys
        .iter()
        .flat_map(|&y| {
            xs.iter().map(move |&x| {
                let p = img.get_pixel(x, y).0;
                luma(p[0], p[1], p[2])
            })
        })
        .collect();

    let mut sorted = grid.clone();
    sorted.sort_by(f32::total_cmp);
    let threshold = sorted[((sorted.len() - 1) as f32 * DARK_PERCENTILE) as usize];
    let median = sorted[sorted.len() / 2];
    // A small blob leaves the percentile at skin level; the median guard
    // keeps skin out.
    let dark: Vec<bool> = grid.iter().map(|&v| v <= threshold && v < median).collect();

    let dark_count = dark.iter().filter(|&&d| d).count();
    if dark_count < MIN_DARK_SAMPLES {
        tracing::debug!(dark_count, "mouth detection: too few dark samples");
        return None;
    }

    let mut seen = vec![false; dark.len()];
    let mut best: Option<Vec<usize>> = None;
    let mut queue = VecDeque::new();
    for start in 0..dark.len() {
        if !dark[start] || seen[start] {
            continue;
        }
        seen[start] = true;
        queue.push_back(start);
        let mut members = Vec::new();
        let mut touches_edge = false;
        while let Some(idx) = queue.pop_front() {
            members.push(idx);
            let (gx, gy) = (idx % gw, idx / gw);
            if gx == 0 || gx + 1 == gw || gy + 1 == gh {
                touches_edge = true;
            }
            let neighbours = [
                (gx > 0).then(|| idx - 1),
                (gx + 1 < gw).then(|| idx + 1),
                (gy > 0).then(|| idx - gw),
                (gy + 1 < gh).then(|| idx + gw),
            ];
            for n in neighbours.into_iter().flatten() {
                if dark[n] && !seen[n] {
                    seen[n] = true;
                    queue.push_back(n);
                }
            }
        }
        if !touches_edge && best.as_ref().map_or(true, |b| members.len() > b.len()) {
            best = Some(members);
        }
    }

    let members = best?;
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (u32::MAX, 0, u32::MAX, 0);
    let (mut sum_x, mut sum_y) = (0.0f64, 0.0f64);
    for &idx in &members {
        let (x, y) = (xs[idx % gw], ys[idx / gw]);
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);
        sum_x += x as f64;
        sum_y += y as f64;
    }
    let n = members.len() as f64;
    let region = MouthRegion {
        cx: (sum_x / n) as f32,
        cy: (sum_y / n) as f32,
        width: ((max_x - min_x).max(stride)) as f32 * WIDEN,
        height: ((max_y - min_y).max(stride)) as f32 * HEIGHTEN,
    };
    tracing::info!(?region, samples = members.len(), "mouth region detected");
    Some(region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn parse_accepts_four_numbers() {
        let r = MouthRegion::parse("508, 728,180,250").expect("valid");
        assert_eq!(r.cx, 508.0);
        assert_eq!(r.height, 250.0);
        assert!(MouthRegion::parse("1,2,3").is_err());
        assert!(MouthRegion::parse("1,2,x,4").is_err());
        assert!(MouthRegion::parse("1,2,0,4").is_err());
    }

    #[test]
    fn default_region_uses_fractions() {
        let r = MouthRegion::default_for(200, 100);
        assert!((r.cx - 100.0).abs() < 1e-4);
        assert!((r.cy - 71.0).abs() < 1e-4);
        assert!((r.width - 36.0).abs() < 1e-4);
        assert!((r.height - 12.0).abs() < 1e-4);
    }

    #[test]
    fn bounds_clip_to_image() {
        let r = MouthRegion {
            cx: 2.0,
            cy: 2.0,
            width: 10.0,
            height: 10.0,
        };
        assert_eq!(r.pixel_bounds(5, 5), Some((0, 0, 5, 5)));
        let off = MouthRegion { cx: -50.0, ..r };
        assert_eq!(off.pixel_bounds(5, 5), None);
    }

    #[test]
    fn detects_dark_blob_inside_a_face() {
        let mut img = RgbaImage::from_pixel(160, 200, Rgba([220, 220, 220, 255]));
        for y in 130..146 {
            for x in 60..100 {
                img.put_pixel(x, y, Rgba([5, 5, 5, 255]));
            }
        }
        let r = detect_mouth_region(&img).expect("mouth found");
        assert!((r.cx - 80.0).abs() < 4.0, "cx {}", r.cx);
        assert!((r.cy - 138.0).abs() < 4.0, "cy {}", r.cy);
        assert!(r.width > 40.0 && r.width < 56.0, "w {}", r.width);
        assert!(r.height > 18.0, "h {}", r.height);
    }

    #[test]
    fn uniform_photo_falls_back() {
        let img = RgbaImage::from_pixel(160, 200, Rgba([128, 128, 128, 255]));
        // Nothing is darker than the median.
        assert!(detect_mouth_region(&img).is_none());
        assert!(detect_mouth_region(&RgbaImage::new(4, 4)).is_none());
    }
}
