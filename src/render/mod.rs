pub mod frame;
pub mod halfblock;
pub mod hud;

use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use crossterm::style::Color;

use crate::config::RainConfig;
use crate::depth::source::{DepthSourceHost, DepthSourceSpec};
use crate::depth::DepthField;
use crate::face::FaceWarpRenderer;
use crate::rain::canvas::CellCanvas;
use crate::rain::RainSimulation;
use crate::speech::{SpeechTimeline, VisemeEvent};

pub fn rgb_to_ansi256(r: u8, g: u8, b: u8) -> u8 {
    if r == g && g == b {
        if r < 8 {
            return 16;
        }
        if r > 248 {
            return 231;
        }
        return 232 + ((r as f32 - 8.0) / 247.0 * 24.0) as u8;
    }
    let ri = (r as f32 / 255.0 * 5.0 + 0.5) as u8;
    let gi = (g as f32 / 255.0 * 5.0 + 0.5) as u8;
    let bi = (b as f32 / 255.0 * 5.0 + 0.5) as u8;
    16 + 36 * ri + 6 * gi + bi
}

pub fn make_color(r: u8, g: u8, b: u8, use_truecolor: bool) -> Color {
    if use_truecolor {
        Color::Rgb { r, g, b }
    } else {
        Color::AnsiValue(rgb_to_ansi256(r, g, b))
    }
}

/// Guess 24-bit colour support from the environment.
pub fn detect_truecolor() -> bool {
    match std::env::var("COLORTERM") {
        Ok(val) => !val.is_empty() && (val == "truecolor" || val == "24bit"),
        Err(_) => match std::env::var("TERM_PROGRAM") {
            Ok(prog) => prog != "Apple_Terminal",
            Err(_) => match std::env::var("TERM") {
                Ok(term) => {
                    term.contains("ghostty") || term.contains("kitty") || term.contains("wezterm")
                }
                Err(_) => false,
            },
        },
    }
}

/// Terminal columns taken by `ch`: 2 for East Asian wide/fullwidth, else 1.
pub fn display_width(ch: char) -> usize {
    let c = ch as u32;
    let wide = matches!(c,
        0x1100..=0x115F
        | 0x2E80..=0x303E
        | 0x3041..=0x33FF
        | 0x3400..=0x4DBF
        | 0x4E00..=0x9FFF
        | 0xA000..=0xA4CF
        | 0xAC00..=0xD7A3
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFF60
        | 0xFFE0..=0xFFE6
        | 0x20000..=0x3FFFD
    );
    if wide {
        2
    } else {
        1
    }
}

pub type HalfblockCell = ([u8; 3], [u8; 3]);

pub const HALF_BLOCK: char = '\u{2584}';
pub const FRAME_TARGET: Duration = Duration::from_millis(16);
pub const STATUS_TTL: Duration = Duration::from_secs(4);

/// One-line message shown in the HUD until it expires.
#[derive(Debug, Clone)]
pub struct StatusLine {
    pub text: String,
    pub since: Instant,
}

impl StatusLine {
    pub fn is_live(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.since) < STATUS_TTL
    }
}

pub struct AppState {
    /// Live configuration; input edits this, frames read a snapshot.
    pub config: RainConfig,
    pub rain: RainSimulation,
    pub canvas: CellCanvas,
    pub depth: DepthField,
    pub sources: DepthSourceHost,
    pub source_specs: Vec<DepthSourceSpec>,
    pub source_index: usize,
    pub speech: SpeechTimeline,
    pub viseme_rx: Receiver<VisemeEvent>,
    pub face: FaceWarpRenderer,
    pub say_text: String,
    pub snapshot_dir: PathBuf,
    pub status: Option<StatusLine>,
    pub hud_string_buf: String,
    pub input_state: crate::input::state::InputState,
    pub show_hud: bool,
    pub show_face: bool,
    pub paused: bool,
    pub frame_count: u64,
    pub last_frame_time: Instant,
    pub fps: f32,
    pub use_truecolor: bool,
}

impl AppState {
    pub fn set_status(&mut self, text: impl Into<String>) {
        self.status = Some(StatusLine {
            text: text.into(),
            since: Instant::now(),
        });
    }

    /// Open the configured source at `index` (wrapping) and rebuild the rain
    /// layout against it.
    pub fn select_source(&mut self, index: usize) {
        if self.source_specs.is_empty() {
            return;
        }
        self.source_index = index % self.source_specs.len();
        let spec = self.source_specs[self.source_index].clone();
        tracing::info!(source = %spec.label(), index = self.source_index, "switching depth source");
        self.sources.switch(spec, &mut self.depth);
        self.rain.invalidate();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::face::region::MouthRegion;
    use crate::face::FULL_FPS;
    use crate::speech::engine::SimulatedEngine;
    use crate::speech::Language;
    use image::{Rgba, RgbaImage};
    use std::sync::mpsc;

    /// Small app wired to the simulated engine and a flat grey face.
    pub fn make_state() -> AppState {
        let (tx, rx) = mpsc::channel();
        let face = RgbaImage::from_pixel(32, 40, Rgba([180, 180, 180, 255]));
        let region = MouthRegion::default_for(32, 40);
        AppState {
            config: RainConfig::default(),
            rain: RainSimulation::new(),
            canvas: CellCanvas::new(20, 10),
            depth: DepthField::new(),
            sources: DepthSourceHost::new(),
            source_specs: vec![
                DepthSourceSpec::LiveFace,
                DepthSourceSpec::Image(PathBuf::from("/nonexistent/depth.png")),
            ],
            source_index: 0,
            speech: SpeechTimeline::new(
                Some(Box::new(SimulatedEngine::new(false))),
                Language::Auto,
                tx,
            ),
            viseme_rx: rx,
            face: FaceWarpRenderer::new(face, region, FULL_FPS),
            say_text: "hello".to_string(),
            snapshot_dir: std::env::temp_dir(),
            status: None,
            hud_string_buf: String::new(),
            input_state: crate::input::state::InputState::default(),
            show_hud: true,
            show_face: true,
            paused: false,
            frame_count: 0,
            last_frame_time: Instant::now(),
            fps: 0.0,
            use_truecolor: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ansi_fallback_maps_greys_and_primaries() {
        assert_eq!(rgb_to_ansi256(0, 0, 0), 16);
        assert_eq!(rgb_to_ansi256(255, 255, 255), 231);
        assert_eq!(rgb_to_ansi256(255, 0, 0), 196);
        assert_eq!(rgb_to_ansi256(0, 255, 0), 46);
    }

    #[test]
    fn cjk_glyphs_are_double_width() {
        assert_eq!(display_width('舍'), 2);
        assert_eq!(display_width('a'), 1);
        assert_eq!(display_width('\u{FF8A}'), 1);
        assert_eq!(display_width('\u{FF10}'), 2);
    }

    #[test]
    fn source_selection_wraps() {
        let mut app = test_support::make_state();
        app.select_source(3);
        assert_eq!(app.source_index, 1);
        assert!(matches!(app.sources.spec(), Some(DepthSourceSpec::Image(_))));
        // Missing image: the field must not keep stale data.
        assert!(app.depth.dimensions().is_none());
        app.select_source(0);
        assert!(app.sources.is_live_face());
    }
}
