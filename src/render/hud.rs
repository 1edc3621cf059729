use crossterm::{
    cursor, queue,
    style::{Print, SetBackgroundColor, SetForegroundColor},
};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::time::Instant;

use super::{make_color, AppState};
use crate::config::RainConfig;

pub const CONTROLS: &str = "+/-:Speed d/D:Density t/T:Trail o/O:Persist h/H:Hue f/F:Font g/G:Glow i/I:Depth n:Next r:Reset s:Say x:Stop c:Snap v:Face Space:Pause Tab:HUD q:Quit";

fn truncate_and_pad_in_place(text: &mut String, width: usize) {
    if width == 0 {
        text.clear();
        return;
    }

    let mut seen_chars = 0usize;
    let mut truncate_byte = None;
    for (idx, _) in text.char_indices() {
        if seen_chars == width {
            truncate_byte = Some(idx);
            break;
        }
        seen_chars += 1;
    }

    if let Some(idx) = truncate_byte {
        text.truncate(idx);
    } else {
        for _ in seen_chars..width {
            text.push(' ');
        }
    }
}

/// Fill `hud` with the status line for the current frame.
pub fn format_status(app_state: &AppState, cfg: &RainConfig, hud: &mut String) -> std::fmt::Result {
    hud.clear();
    let source = app_state
        .sources
        .spec()
        .map(|s| s.label())
        .unwrap_or_else(|| "none".to_string());
    let source_state = app_state.sources.state().name();
    write!(
        hud,
        "FPS:{:>5.1}  Cols:{}  Src:{}[{}]",
        app_state.fps,
        app_state.rain.columns().len(),
        source,
        source_state
    )?;
    match app_state.depth.dimensions() {
        Some((w, h)) => write!(hud, " {w}x{h}")?,
        None => hud.push_str(" flat"),
    }
    write!(
        hud,
        "  Spd:{:.2} Den:{:.2} Trl:{:.2} Per:{:.2} Hue:{:.0} Font:{:.0} Glow:{:.2} Depth:{:.2}",
        cfg.speed,
        cfg.density,
        cfg.trail,
        cfg.persistence,
        cfg.color_hue,
        cfg.font_size,
        cfg.glow,
        cfg.depth_influence,
    )?;

    let engine = app_state.speech.engine_name().unwrap_or("no-engine");
    if let Some(text) = app_state.speech.text() {
        let head: String = text.chars().take(16).collect();
        write!(hud, "  TTS:{engine}:\"{head}\"")?;
    } else {
        write!(hud, "  TTS:{engine}:idle")?;
    }
    if let Some(v) = app_state.face.last_viseme() {
        write!(hud, " {:?}", v.viseme)?;
    }
    let face = app_state.face.state();
    write!(hud, " open:{:.2} k:{:.2}", face.current_openness, face.blend())?;
    if app_state.paused {
        hud.push_str("  PAUSED");
    }
    if let Some(status) = app_state.status.as_ref().filter(|s| s.is_live(Instant::now())) {
        write!(hud, "  | {}", status.text)?;
    }
    Ok(())
}

pub fn draw_hud(
    app_state: &mut AppState,
    cfg: &RainConfig,
    cols: u16,
    rows: u16,
    stdout: &mut impl Write,
) -> io::Result<()> {
    let width = cols as usize;
    let mut hud = std::mem::take(&mut app_state.hud_string_buf);
    format_status(app_state, cfg, &mut hud).map_err(|_| io::Error::other("failed to format HUD"))?;
    truncate_and_pad_in_place(&mut hud, width);

    let tc = app_state.use_truecolor;
    queue!(
        stdout,
        cursor::MoveTo(0, 0),
        SetBackgroundColor(make_color(0, 0, 0, tc)),
        SetForegroundColor(make_color(245, 245, 245, tc)),
        Print(hud.as_str())
    )?;

    hud.clear();
    hud.push_str(CONTROLS);
    truncate_and_pad_in_place(&mut hud, width);

    queue!(
        stdout,
        cursor::MoveTo(0, rows.saturating_sub(1)),
        SetBackgroundColor(make_color(0, 0, 0, tc)),
        SetForegroundColor(make_color(220, 220, 220, tc)),
        Print(hud.as_str())
    )?;

    app_state.hud_string_buf = hud;
    Ok(())
}
