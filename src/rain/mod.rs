pub mod canvas;

use rand::Rng;

use crate::config::{GlyphSet, RainConfig};
use crate::depth::DepthField;
use crate::math::{clamp01, hash32, hsv_to_rgb};
use canvas::CellCanvas;

/// Rows a head travels past the bottom edge before it respawns.
pub const RESPAWN_MARGIN_ROWS: f32 = 4.0;
const RESPAWN_JITTER_ROWS: f32 = 6.0;
const FOREGROUND_SEGMENTS: usize = 3;
const BACKGROUND_SEGMENTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub head_row: f32,
    pub speed_mul: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub segments: Vec<Segment>,
    pub glyph_seed: u32,
}

impl Column {
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

/// Glyph for a cell at a given time: pure in all four inputs.
pub fn glyph_at(glyphs: &GlyphSet, col: usize, row: i64, time: u32, seed: u32) -> char {
    let mixed = (col as u32).wrapping_mul(73_856_093)
        ^ (row as i32 as u32).wrapping_mul(19_349_663)
        ^ time
        ^ seed;
    let r = hash32(mixed);
    glyphs.at((r * glyphs.len() as f32) as usize)
}

/// Number of columns that get the foreground segment count: ceil(30%).
pub fn foreground_quota(cols: usize) -> usize {
    ((cols * 3).div_ceil(10)).min(cols)
}

/// Rank columns by depth score; the top 30% get three segments.
pub fn assign_segment_counts(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    let quota = foreground_quota(scores.len());
    let mut counts = vec![BACKGROUND_SEGMENTS; scores.len()];
    for &idx in order.iter().take(quota) {
        counts[idx] = FOREGROUND_SEGMENTS;
    }
    counts
}

pub fn columns_needed(viewport_width: f32, font_size: f32) -> usize {
    ((viewport_width / font_size.max(8.0)).floor() as usize).max(1)
}

/// Translucent overlay alpha: more persistence, longer trails.
pub fn fade_alpha(persistence: f32) -> f32 {
    (0.32 - 0.26 * persistence).clamp(0.04, 0.34)
}

pub fn skip_every(density: f32) -> usize {
    (2.2 - density.min(2.0)).round().max(1.0) as usize
}

/// Only the nearer half of the depth range contributes, quadratically.
pub fn depth_boost(depth: f32) -> f32 {
    let b = clamp01((depth - 0.35) * 2.0);
    b * b
}

pub fn fall_factor(head_depth: f32) -> f32 {
    0.6 + 1.2 * (1.0 - head_depth)
}

pub fn effective_tail_len(base_tail: usize, segment_count: usize) -> usize {
    ((base_tail as f32 / (segment_count.max(1) as f32).sqrt()).round() as usize).max(2)
}

/// Per-frame derived values from one config snapshot and viewport.
#[derive(Debug, Clone, Copy)]
struct FrameParams {
    font_size: f32,
    viewport_h: f32,
    base_tail: usize,
    fade_rate: f32,
    speed: f32,
}

impl FrameParams {
    fn new(cfg: &RainConfig, viewport_h: f32) -> Self {
        let font_size = cfg.cell_font_size();
        let rows_visible = viewport_h / font_size;
        let trail_factor = cfg.trail.clamp(0.25, 1.6);
        let persistence = clamp01(cfg.persistence);
        let base_tail = ((rows_visible * 0.32 * trail_factor * (1.0 + 0.6 * persistence)).round()
            as usize)
            .max(4);
        let fade_rate = (3.4 - 1.5 * trail_factor).max(0.6) * (1.0 - 0.45 * persistence);
        Self {
            font_size,
            viewport_h,
            base_tail,
            fade_rate,
            speed: cfg.speed.max(0.05),
        }
    }

    fn respawn_row(&self) -> f32 {
        (self.viewport_h + RESPAWN_MARGIN_ROWS * self.font_size) / self.font_size
    }
}

#[derive(Debug, Default)]
pub struct RainSimulation {
    columns: Vec<Column>,
    layout: Option<(usize, u32)>,
    glyph_clock: f32,
}

impl RainSimulation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Force a rebuild on the next frame (e.g. the depth source changed).
    pub fn invalidate(&mut self) {
        self.layout = None;
    }

    fn ensure_columns(
        &mut self,
        viewport: (f32, f32),
        font_size: f32,
        depth: &DepthField,
        rng: &mut impl Rng,
    ) {
        let cols = columns_needed(viewport.0, font_size);
        let key = (cols, font_size.to_bits());
        if self.layout == Some(key) {
            return;
        }
        self.layout = Some(key);

        let mid_y = viewport.1 * 0.5;
        let scores: Vec<f32> = (0..cols)
            .map(|i| depth.query(i as f32 * font_size + font_size * 0.5, mid_y))
            .collect();
        let counts = assign_segment_counts(&scores);
        let rows_visible = viewport.1 / font_size;

        self.columns = counts
            .into_iter()
            .map(|count| {
                let segments = (0..count)
                    .map(|idx| {
                        let phase = if idx == 0 || count < 2 {
                            0.0
                        } else {
                            idx as f32 / (count - 1) as f32 * 1.3 + rng.random_range(0.0..0.25)
                        };
                        Segment {
                            head_row: -phase * rows_visible,
                            speed_mul: 0.7 + rng.random_range(0.0..0.6),
                        }
                    })
                    .collect();
                Column {
                    segments,
                    glyph_seed: rng.random(),
                }
            })
            .collect();

        tracing::debug!(cols, font_size, "rain columns rebuilt");
    }

    /// Advance and draw one frame from a config snapshot.
    pub fn frame(
        &mut self,
        cfg: &RainConfig,
        depth: &DepthField,
        canvas: &mut CellCanvas,
        dt: f32,
        rng: &mut impl Rng,
    ) {
        let viewport = canvas.viewport_px();
        if viewport.0 <= 0.0 || viewport.1 <= 0.0 {
            return;
        }
        let params = FrameParams::new(cfg, viewport.1);
        self.ensure_columns(viewport, params.font_size, depth, rng);

        canvas.fade(fade_alpha(clamp01(cfg.persistence)));
        self.glyph_clock += dt.max(0.0) * cfg.glyph_speed.max(0.0);
        let time = (self.glyph_clock * 2.0).floor() as u32;

        let skip = skip_every(cfg.density);
        let fs = params.font_size;

        for (i, column) in self.columns.iter_mut().enumerate() {
            if i % skip != 0 {
                continue;
            }
            let x = i as f32 * fs;
            let sample_x = x + fs * 0.5;
            let count = column.segment_count();
            let tail_len = effective_tail_len(params.base_tail, count);

            for seg_idx in 0..count {
                let head_row = column.segments[seg_idx].head_row;
                draw_segment(
                    cfg,
                    &params,
                    depth,
                    canvas,
                    (i, x, sample_x),
                    head_row,
                    tail_len,
                    time,
                    column.glyph_seed,
                );

                let head_depth = depth.query(sample_x, head_row * fs);
                let segment = &mut column.segments[seg_idx];
                segment.head_row += params.speed * fall_factor(head_depth) * segment.speed_mul * 0.12;

                if segment.head_row > params.respawn_row() {
                    segment.head_row = -(tail_len as f32) - rng.random_range(0.0..RESPAWN_JITTER_ROWS);
                    segment.speed_mul = 0.7 + rng.random_range(0.0..0.6);
                    if seg_idx == 0 {
                        column.glyph_seed = rng.random();
                    }
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_segment(
    cfg: &RainConfig,
    params: &FrameParams,
    depth: &DepthField,
    canvas: &mut CellCanvas,
    (col, x, sample_x): (usize, f32, f32),
    head_row: f32,
    tail_len: usize,
    time: u32,
    seed: u32,
) {
    let fs = params.font_size;
    for k in 0..tail_len {
        let row = head_row - k as f32;
        let y = row * fs;
        if y < -2.0 * fs || y > params.viewport_h + fs {
            continue;
        }

        let boost = depth_boost(depth.query(sample_x, y));
        let size = (fs * (0.8 + boost * cfg.depth_influence * 1.1)).max(8.0);
        let scale = size / fs;
        let glyph = glyph_at(&cfg.glyphs, col, row.floor() as i64, time, seed);

        if k == 0 {
            canvas.draw_glyph(glyph, x, y, scale, [255, 255, 255], 0.7 + 0.3 * boost);
            continue;
        }

        let frac = k as f32 / tail_len as f32;
        let mut brightness = (-params.fade_rate * frac).exp();
        if k == 1 {
            brightness *= 1.0 + 0.6 * clamp01(cfg.glow);
        }
        let brightness = clamp01(brightness);
        let tint = hsv_to_rgb(cfg.color_hue, 0.9 - 0.25 * boost, 1.0);
        let rgb = [
            (tint[0] as f32 * brightness) as u8,
            (tint[1] as f32 * brightness) as u8,
            (tint[2] as f32 * brightness) as u8,
        ];
        canvas.draw_glyph(glyph, x, y, scale, rgb, 0.35 + 0.65 * brightness);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn glyph_selection_is_deterministic() {
        let glyphs = GlyphSet::default();
        let a = glyph_at(&glyphs, 3, -2, 11, 0xABCD);
        assert_eq!(a, glyph_at(&glyphs, 3, -2, 11, 0xABCD));
        let tiny = GlyphSet::new("0");
        assert_eq!(glyph_at(&tiny, 9, 9, 9, 9), '0');
    }

    #[test]
    fn quota_is_ceil_thirty_percent() {
        assert_eq!(foreground_quota(1), 1);
        assert_eq!(foreground_quota(3), 1);
        assert_eq!(foreground_quota(10), 3);
        assert_eq!(foreground_quota(11), 4);
        assert_eq!(foreground_quota(100), 30);
        for n in 1..200 {
            let counts = assign_segment_counts(&vec![0.5; n]);
            let expected = ((n as f64) * 0.3 - 1e-9).ceil() as usize;
            assert_eq!(counts.iter().filter(|&&c| c == 3).count(), expected.min(n));
            assert!(counts.iter().all(|&c| c == 2 || c == 3));
        }
    }

    #[test]
    fn deepest_columns_get_three_segments() {
        let scores = [0.1, 0.9, 0.2, 0.8, 0.3, 0.4, 0.5, 0.0, 0.05, 0.7];
        let counts = assign_segment_counts(&scores);
        assert_eq!(counts[1], 3);
        assert_eq!(counts[3], 3);
        assert_eq!(counts[9], 3);
        assert_eq!(counts.iter().filter(|&&c| c == 3).count(), 3);
    }

    #[test]
    fn layout_formulas() {
        assert_eq!(columns_needed(100.0, 16.0), 6);
        assert_eq!(columns_needed(100.0, 2.0), 12);
        assert_eq!(columns_needed(4.0, 16.0), 1);
        assert!((fade_alpha(0.0) - 0.32).abs() < 1e-6);
        assert!((fade_alpha(1.0) - 0.06).abs() < 1e-6);
        assert_eq!(fade_alpha(5.0), 0.04);
        assert_eq!(skip_every(1.25), 1);
        assert_eq!(skip_every(0.2), 2);
        assert_eq!(depth_boost(0.35), 0.0);
        assert_eq!(depth_boost(1.0), 1.0);
        assert!((depth_boost(0.6) - 0.25).abs() < 1e-6);
        assert_eq!(effective_tail_len(12, 3), 7);
        assert_eq!(effective_tail_len(2, 3), 2);
    }

    #[test]
    fn segments_stagger_and_match_counts() {
        let mut sim = RainSimulation::new();
        let mut canvas = CellCanvas::new(40, 20);
        let depth = DepthField::new();
        sim.frame(&RainConfig::default(), &depth, &mut canvas, 0.016, &mut rng());

        assert_eq!(sim.columns().len(), columns_needed(320.0, 16.0));
        for col in sim.columns() {
            assert!(matches!(col.segment_count(), 2 | 3));
            let heads: Vec<f32> = col.segments.iter().map(|s| s.head_row).collect();
            // Primary starts at the top; later segments sit further above.
            assert!(heads[0] > -1.0);
            assert!(heads.windows(2).all(|w| w[1] < w[0]));
            assert!(col
                .segments
                .iter()
                .all(|s| (0.7..1.3).contains(&s.speed_mul)));
        }
    }

    #[test]
    fn heads_advance_and_respawn_above_viewport() {
        let mut sim = RainSimulation::new();
        let mut canvas = CellCanvas::new(16, 10);
        let depth = DepthField::new();
        let cfg = RainConfig {
            speed: 8.0,
            ..RainConfig::default()
        };
        let mut rng = rng();
        sim.frame(&cfg, &depth, &mut canvas, 0.016, &mut rng);

        let params = FrameParams::new(&cfg, canvas.viewport_px().1);
        let before = sim.columns()[0].segments[0].head_row;
        sim.frame(&cfg, &depth, &mut canvas, 0.016, &mut rng);
        let after = sim.columns()[0].segments[0].head_row;
        assert!(after > before);

        let count = sim.columns()[0].segment_count();
        let tail = effective_tail_len(params.base_tail, count) as f32;
        let mut respawned = false;
        let mut prev = after;
        for _ in 0..2_000 {
            let seed_before = sim.columns()[0].glyph_seed;
            sim.frame(&cfg, &depth, &mut canvas, 0.016, &mut rng);
            let head = sim.columns()[0].segments[0].head_row;
            if head < prev {
                assert!(head <= -tail, "respawn must land above the viewport");
                assert_ne!(seed_before, sim.columns()[0].glyph_seed);
                respawned = true;
                break;
            }
            prev = head;
        }
        assert!(respawned);
    }

    #[test]
    fn bright_depth_slows_the_fall() {
        let mut near = DepthField::new();
        near.resample(&RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255])), 128, 160);
        let far = DepthField::new();
        assert!(fall_factor(near.query(10.0, 10.0)) < fall_factor(far.query(10.0, 10.0)));
        assert!((fall_factor(1.0) - 0.6).abs() < 1e-6);
        assert!((fall_factor(0.0) - 1.8).abs() < 1e-6);
    }

    #[test]
    fn frame_draws_white_heads() {
        let mut sim = RainSimulation::new();
        let mut canvas = CellCanvas::new(8, 12);
        let depth = DepthField::new();
        let cfg = RainConfig::default();
        let mut rng = rng();
        for _ in 0..60 {
            sim.frame(&cfg, &depth, &mut canvas, 0.016, &mut rng);
        }
        let lit = (0..canvas.rows())
            .flat_map(|r| (0..canvas.cols()).map(move |c| (c, r)))
            .filter_map(|(c, r)| canvas.cell(c, r))
            .filter(|cell| !cell.is_blank())
            .count();
        assert!(lit > 0);
    }
}
