pub mod source;

use image::RgbaImage;
use rayon::prelude::*;
use std::time::{Duration, Instant};

use crate::math::{clamp01, luma, sample_bilinear};

/// Neutral depth returned whenever there is no data to sample.
pub const NEUTRAL_DEPTH: f32 = 0.5;
/// Minimum spacing between resamples of streaming sources (~30 Hz).
pub const RESAMPLE_INTERVAL: Duration = Duration::from_millis(33);

const CURVE_CONTRAST: f32 = 1.25;
const CURVE_GAMMA: f32 = 0.7;

fn build_lookup_curve() -> [f32; 256] {
    let mut curve = [0.0f32; 256];
    for (i, slot) in curve.iter_mut().enumerate() {
        let v = i as f32 / 255.0;
        let stretched = clamp01((v - 0.5) * CURVE_CONTRAST + 0.5);
        let d = stretched - 0.5;
        let shaped = 0.5 + d.signum() * (d.abs() * 2.0).powf(CURVE_GAMMA) * 0.5;
        *slot = clamp01(if d == 0.0 { 0.5 } else { shaped });
    }
    curve
}

#[derive(Debug, Clone)]
struct LumaBuffer {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

/// Luminance grid sampled from the active depth source.
#[derive(Debug, Clone)]
pub struct DepthField {
    lookup: [f32; 256],
    buffer: Option<LumaBuffer>,
}

impl Default for DepthField {
    fn default() -> Self {
        Self::new()
    }
}

impl DepthField {
    pub fn new() -> Self {
        Self {
            lookup: build_lookup_curve(),
            buffer: None,
        }
    }

    pub fn dimensions(&self) -> Option<(usize, usize)> {
        self.buffer.as_ref().map(|b| (b.width, b.height))
    }

    pub fn clear(&mut self) {
        self.buffer = None;
    }

    /// Cover-fit `source` into a `target_width x target_height` grid and
    /// replace the luminance buffer wholesale.
    ///
    /// An empty source or target leaves the previous buffer untouched.
    pub fn resample(&mut self, source: &RgbaImage, target_width: usize, target_height: usize) {
        let (sw, sh) = source.dimensions();
        if sw == 0 || sh == 0 || target_width == 0 || target_height == 0 {
            tracing::debug!(sw, sh, target_width, target_height, "skipping depth resample");
            return;
        }

        let scale = (target_width as f32 / sw as f32).max(target_height as f32 / sh as f32);
        let draw_w = sw as f32 * scale;
        let draw_h = sh as f32 * scale;
        let offset_x = (target_width as f32 - draw_w) * 0.5;
        let offset_y = (target_height as f32 - draw_h) * 0.5;
        let inv_scale = 1.0 / scale;
        let max_x = (sw - 1) as f32;
        let max_y = (sh - 1) as f32;

        let mut data = vec![0u8; target_width * target_height];
        data.par_chunks_mut(target_width)
            .enumerate()
            .for_each(|(y, row)| {
                let sy = ((y as f32 + 0.5 - offset_y) * inv_scale - 0.5).clamp(0.0, max_y);
                for (x, out) in row.iter_mut().enumerate() {
                    let sx = ((x as f32 + 0.5 - offset_x) * inv_scale - 0.5).clamp(0.0, max_x);
                    let [r, g, b, a] = sample_bilinear(source, sx, sy);
                    // Transparent regions composite over the black background.
                    let alpha = a as f32 / 255.0;
                    *out = (luma(r, g, b) * alpha).round().clamp(0.0, 255.0) as u8;
                }
            });

        self.buffer = Some(LumaBuffer {
            width: target_width,
            height: target_height,
            data,
        });
    }

    /// Depth at a viewport pixel. Neutral when empty or out of bounds.
    pub fn query(&self, x: f32, y: f32) -> f32 {
        let Some(buf) = self.buffer.as_ref() else {
            return NEUTRAL_DEPTH;
        };
        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
            return NEUTRAL_DEPTH;
        }
        let ix = x.floor() as usize;
        let iy = y.floor() as usize;
        if ix >= buf.width || iy >= buf.height {
            return NEUTRAL_DEPTH;
        }
        self.lookup[buf.data[iy * buf.width + ix] as usize]
    }
}

/// Rate limiter for pixel readback from streaming sources.
#[derive(Debug, Clone)]
pub struct ResampleThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ResampleThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Returns true (and arms the timer) when a resample may run at `now`.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

impl Default for ResampleThrottle {
    fn default() -> Self {
        Self::new(RESAMPLE_INTERVAL)
    }
}
