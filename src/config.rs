use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::error::ConfigError;

pub const DEFAULT_GLYPHS: &str = "舍利子色不异空即是受想行识亦复如是诸法相生灭垢淨增减故中无眼耳鼻舌身意声香味触法界乃至明尽老死苦集道智得以菩提萨埵依般若波罗蜜多心罣碍有恐怖远离颠倒梦想究竟涅槃三世诸佛得阿耨多罗三藐大知神咒明上等能除一切真实虚说曰揭谛波罗僧萨婆诃";
pub const LIVE_FACE_SOURCE: &str = "tts-live-face";

/// Candidate characters for the rain. Cheap to clone; never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct GlyphSet(Arc<[char]>);

impl GlyphSet {
    pub fn new(glyphs: &str) -> Self {
        let chars: Vec<char> = glyphs.chars().filter(|c| !c.is_control()).collect();
        if chars.is_empty() {
            return Self(DEFAULT_GLYPHS.chars().collect());
        }
        Self(chars.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for sets built through [`GlyphSet::new`].
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index arithmetic wraps, so any index is valid.
    pub fn at(&self, idx: usize) -> char {
        if self.is_empty() {
            return ' ';
        }
        self.0[idx % self.len()]
    }
}

impl Default for GlyphSet {
    fn default() -> Self {
        Self::new(DEFAULT_GLYPHS)
    }
}

impl From<String> for GlyphSet {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<GlyphSet> for String {
    fn from(value: GlyphSet) -> Self {
        value.0.iter().collect()
    }
}

/// Everything the rain and the face renderer read per frame.
///
/// Input handlers mutate the live copy; the frame loop clones a snapshot once
/// at the top of each frame and never reads the live copy mid-frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RainConfig {
    pub speed: f32,
    pub density: f32,
    pub font_size: f32,
    pub glow: f32,
    pub trail: f32,
    pub persistence: f32,
    pub glyph_speed: f32,
    pub depth_influence: f32,
    pub color_hue: f32,
    pub glyphs: GlyphSet,
    pub depth_url: String,
}

impl Default for RainConfig {
    fn default() -> Self {
        Self {
            speed: 2.6,
            density: 1.25,
            font_size: 16.0,
            glow: 0.5,
            trail: 0.8,
            persistence: 0.5,
            glyph_speed: 0.6,
            depth_influence: 0.9,
            color_hue: 140.0,
            glyphs: GlyphSet::default(),
            depth_url: LIVE_FACE_SOURCE.to_string(),
        }
    }
}

impl RainConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Font size as used for layout; never below 8px.
    pub fn cell_font_size(&self) -> f32 {
        self.font_size.max(8.0)
    }

    pub fn nudge_speed(&mut self, factor: f32) {
        self.speed = (self.speed * factor).clamp(0.2, 8.0);
    }

    pub fn nudge_density(&mut self, delta: f32) {
        self.density = (self.density + delta).clamp(0.2, 1.8);
    }

    pub fn nudge_trail(&mut self, delta: f32) {
        self.trail = (self.trail + delta).clamp(0.0, 1.6);
    }

    pub fn nudge_persistence(&mut self, delta: f32) {
        self.persistence = (self.persistence + delta).clamp(0.0, 1.0);
    }

    pub fn nudge_font_size(&mut self, delta: f32) {
        self.font_size = (self.font_size + delta).clamp(8.0, 32.0);
    }

    pub fn nudge_glow(&mut self, delta: f32) {
        self.glow = (self.glow + delta).clamp(0.0, 1.0);
    }

    pub fn nudge_depth_influence(&mut self, delta: f32) {
        self.depth_influence = (self.depth_influence + delta).clamp(0.0, 1.5);
    }

    pub fn rotate_hue(&mut self, degrees: f32) {
        self.color_hue = (self.color_hue + degrees).rem_euclid(360.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glyph_index_wraps_for_mixed_width_sets() {
        let set = GlyphSet::new("ab舍");
        assert_eq!(set.len(), 3);
        assert_eq!(set.at(2), '舍');
        assert_eq!(set.at(3), 'a');
        assert_eq!(set.at(usize::MAX), set.at(usize::MAX % 3));
    }

    #[test]
    fn empty_glyph_set_falls_back_to_default() {
        assert_eq!(GlyphSet::new(""), GlyphSet::default());
        let controls: GlyphSet = String::from("\n\t").into();
        assert!(!controls.is_empty());
        assert_eq!(controls.len(), DEFAULT_GLYPHS.chars().count());
        assert!(GlyphSet(Arc::from(Vec::new())).is_empty());
        assert_eq!(GlyphSet(Arc::from(Vec::new())).at(7), ' ');
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: RainConfig =
            serde_json::from_str(r#"{"fontSize": 20, "glyphs": "01", "colorHue": 300}"#)
                .expect("config should parse");
        assert_eq!(cfg.font_size, 20.0);
        assert_eq!(cfg.glyphs, GlyphSet::new("01"));
        assert_eq!(cfg.color_hue, 300.0);
        assert_eq!(cfg.speed, RainConfig::default().speed);
    }

    #[test]
    fn nudges_clamp_and_wrap() {
        let mut cfg = RainConfig::default();
        for _ in 0..100 {
            cfg.nudge_speed(1.2);
            cfg.nudge_density(0.1);
        }
        assert_eq!(cfg.speed, 8.0);
        assert_eq!(cfg.density, 1.8);
        cfg.rotate_hue(-150.0);
        assert!((cfg.color_hue - 350.0).abs() < 1e-4);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = RainConfig::load(Path::new("/definitely/not/here.json"))
            .expect_err("missing file must fail");
        assert!(err.to_string().contains("not/here.json"));
    }
}
