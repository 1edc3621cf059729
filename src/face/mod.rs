pub mod procedural;
pub mod region;

use image::{ImageFormat, RgbaImage};
use rayon::prelude::*;
use std::f32::consts::{FRAC_PI_2, PI};
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use crate::math::{clamp01, ease_in_out_cubic, sample_bilinear, smoothstep};
use crate::speech::VisemeEvent;
pub use region::{detect_mouth_region, MouthRegion};

/// Energy gain so small shapes stay visible on a low-resolution photo.
pub const INTENSITY_MULTIPLIER: f32 = 1.8;
pub const MIN_OPEN: f32 = 0.05;
/// Openness the base photo was captured at.
pub const BASE_OPENNESS: f32 = 0.5;
pub const CLOSE_BOOST: f32 = 1.8;
pub const MAX_SHAPE: f32 = 1.5;

pub const FULL_FPS: u32 = 30;
pub const LITE_FPS: u32 = 15;

const BLEND_WINDOW_MS: f32 = 220.0;
const BLEND_MIN: f32 = 0.12;
const BLEND_MAX: f32 = 0.5;

/// Smoothed mouth parameters, all kept in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct FaceWarpState {
    pub current_openness: f32,
    pub current_width: f32,
    pub current_height: f32,
    pub target_openness: f32,
    pub target_width: f32,
    pub target_height: f32,
    blend: f32,
    last_event: Option<Instant>,
}

impl Default for FaceWarpState {
    fn default() -> Self {
        Self {
            current_openness: BASE_OPENNESS,
            current_width: 0.5,
            current_height: 0.5,
            target_openness: BASE_OPENNESS,
            target_width: 0.5,
            target_height: 0.5,
            blend: BLEND_MAX,
            last_event: None,
        }
    }
}

impl FaceWarpState {
    pub fn blend(&self) -> f32 {
        self.blend
    }

    /// Set new targets from an event. Rapid events get a smaller blend factor.
    pub fn update_target(&mut self, event: &VisemeEvent, now: Instant) {
        let openness = (event.energy * INTENSITY_MULTIPLIER).clamp(MIN_OPEN, 1.0);
        self.target_openness = openness;
        self.target_width = clamp01(event.width.unwrap_or(0.3 + 0.5 * openness));
        self.target_height = clamp01(event.height.unwrap_or(0.1 + 0.8 * openness));

        self.blend = match self.last_event {
            Some(prev) => {
                let dt_ms = now.saturating_duration_since(prev).as_secs_f32() * 1000.0;
                (dt_ms / BLEND_WINDOW_MS).clamp(BLEND_MIN, BLEND_MAX)
            }
            None => BLEND_MAX,
        };
        self.last_event = Some(now);
    }

    /// One smoothing step toward the targets. Closing moves faster.
    pub fn step(&mut self) {
        let t = ease_in_out_cubic(self.blend);
        let approach = |current: f32, target: f32| {
            let k = if target < current {
                (t * CLOSE_BOOST).min(1.0)
            } else {
                t
            };
            clamp01(current + (target - current) * k)
        };
        self.current_openness = approach(self.current_openness, self.target_openness);
        self.current_width = approach(self.current_width, self.target_width);
        self.current_height = approach(self.current_height, self.target_height);
    }
}

/// Sign-preserving, saturating response to the openness offset.
pub fn warp_shape(openness: f32) -> f32 {
    let d = openness - BASE_OPENNESS;
    (d.signum() * MAX_SHAPE * smoothstep(0.0, 0.5, d.abs())).clamp(-MAX_SHAPE, MAX_SHAPE)
}

/// Copy `base` into `out` and displace pixels inside the mouth ellipse.
///
/// Every destination pixel samples the untouched base, so repeated renders
/// never accumulate.
pub fn warp_mouth(
    base: &RgbaImage,
    out: &mut RgbaImage,
    region: &MouthRegion,
    openness: f32,
    width: f32,
    height: f32,
) {
    if out.dimensions() != base.dimensions() {
        *out = base.clone();
    } else {
        out.copy_from_slice(base.as_raw());
    }

    let shape = warp_shape(openness);
    if shape == 0.0 {
        return;
    }
    let (img_w, img_h) = base.dimensions();
    let Some((x0, y0, x1, y1)) = region.pixel_bounds(img_w, img_h) else {
        return;
    };
    let (rx, ry) = region.half_extents();
    let row_len = img_w as usize * 4;
    let amp_y = shape * ry * 0.3 * (0.5 + height);
    let amp_x = shape * rx * 0.18 * (0.5 + width);

    let num_bands = rayon::current_num_threads().max(1);
    let rows = y1 - y0;
    let band_rows = rows.div_ceil(num_bands).max(1);

    let pixels: &mut [u8] = out;
    pixels[y0 * row_len..y1 * row_len]
        .par_chunks_mut(band_rows * row_len)
        .enumerate()
        .for_each(|(band, chunk)| {
            for (i, row) in chunk.chunks_mut(row_len).enumerate() {
                let py = (y0 + band * band_rows + i) as f32;
                let ny = (py - region.cy) / ry;
                for px in x0..x1 {
                    let nx = (px as f32 - region.cx) / rx;
                    let r = nx.hypot(ny);
                    if r >= 1.0 {
                        continue;
                    }
                    let falloff = 0.5 * (1.0 + (PI * r).cos());
                    let dy = amp_y * (ny * FRAC_PI_2).sin() * falloff;
                    let dx = amp_x * nx * falloff;
                    let rgba = sample_bilinear(base, px as f32 - dx, py - dy);
                    row[px * 4..px * 4 + 4].copy_from_slice(&rgba);
                }
            }
        });
}

/// Animates a still photo's mouth from viseme events.
pub struct FaceWarpRenderer {
    base: RgbaImage,
    frame: RgbaImage,
    snapshot: RgbaImage,
    region: MouthRegion,
    state: FaceWarpState,
    min_interval: Duration,
    last_render: Option<Instant>,
    last_viseme: Option<VisemeEvent>,
}

impl FaceWarpRenderer {
    pub fn new(base: RgbaImage, region: MouthRegion, max_fps: u32) -> Self {
        let frame = base.clone();
        let snapshot = base.clone();
        Self {
            base,
            frame,
            snapshot,
            region,
            state: FaceWarpState::default(),
            min_interval: Duration::from_secs(1) / max_fps.max(1),
            last_render: None,
            last_viseme: None,
        }
    }

    pub fn region(&self) -> &MouthRegion {
        &self.region
    }

    pub fn state(&self) -> &FaceWarpState {
        &self.state
    }

    pub fn last_viseme(&self) -> Option<&VisemeEvent> {
        self.last_viseme.as_ref()
    }

    pub fn update_target(&mut self, event: &VisemeEvent, now: Instant) {
        self.state.update_target(event, now);
        self.last_viseme = Some(*event);
    }

    /// Apply every queued event in arrival order; the last one wins.
    pub fn drain(&mut self, events: &Receiver<VisemeEvent>, now: Instant) -> usize {
        let mut applied = 0;
        for event in events.try_iter() {
            self.update_target(&event, now);
            applied += 1;
        }
        applied
    }

    /// Render if the frame budget allows. Returns true when a new frame was
    /// produced and published to the snapshot.
    pub fn render(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_render {
            if now.saturating_duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last_render = Some(now);

        self.state.step();
        warp_mouth(
            &self.base,
            &mut self.frame,
            &self.region,
            self.state.current_openness,
            self.state.current_width,
            self.state.current_height,
        );
        self.snapshot.copy_from_slice(self.frame.as_raw());
        true
    }

    /// Read-only copy of the last finished frame.
    pub fn snapshot(&self) -> &RgbaImage {
        &self.snapshot
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<(), image::ImageError> {
        self.snapshot.save_with_format(path, ImageFormat::Png)?;
        tracing::info!(path = %path.display(), "face snapshot saved");
        Ok(())
    }
}
