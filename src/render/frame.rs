use crossterm::{
    cursor,
    style::{Attribute, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal, queue, Command,
};
use std::io::{self, Write};
use std::time::Instant;

use super::{display_width, make_color, AppState, HalfblockCell, FRAME_TARGET};
use crate::config::RainConfig;
use crate::error::AppResult;
use crate::input::thread::InputReceiver;
use crate::rain::canvas::CellCanvas;

/// Scale at or above which a glyph renders bold; at or below, dim.
pub const BOLD_SCALE: f32 = 1.15;
pub const DIM_SCALE: f32 = 0.85;

const PREVIEW_MAX_COLS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Weight {
    Normal,
    Bold,
    Dim,
}

fn weight_for(scale: f32) -> Weight {
    if scale >= BOLD_SCALE {
        Weight::Bold
    } else if scale <= DIM_SCALE {
        Weight::Dim
    } else {
        Weight::Normal
    }
}

pub fn is_hud_overlay_row(show_hud: bool, row: usize, term_rows: usize) -> bool {
    show_hud && (row == 0 || row == term_rows.saturating_sub(1))
}

/// Cell rectangle `(left, top, cols, rows)` the face preview occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewRect {
    pub left: usize,
    pub top: usize,
    pub cols: usize,
    pub rows: usize,
}

impl PreviewRect {
    pub fn contains(&self, col: usize, row: usize) -> bool {
        col >= self.left && col < self.left + self.cols && row >= self.top && row < self.top + self.rows
    }
}

/// Bottom-right corner box for the face preview, clear of the HUD rows.
pub fn preview_rect(
    img_dims: (u32, u32),
    term_cols: usize,
    term_rows: usize,
    show_hud: bool,
) -> Option<PreviewRect> {
    let reserved = if show_hud { 2 } else { 0 };
    let avail_rows = term_rows.saturating_sub(reserved);
    let max_cols = (term_cols / 4).min(PREVIEW_MAX_COLS);
    let (cols, rows) = super::halfblock::preview_size(img_dims.0, img_dims.1, max_cols, avail_rows / 2);
    if cols < 4 || rows < 2 {
        return None;
    }
    let bottom = if show_hud { term_rows - 1 } else { term_rows };
    Some(PreviewRect {
        left: term_cols - cols,
        top: bottom - rows,
        cols,
        rows,
    })
}

fn write_ansi_command(buf: &mut String, command: impl Command) -> io::Result<()> {
    command
        .write_ansi(buf)
        .map_err(|_| io::Error::other("failed to encode ANSI command"))
}

/// Write the glyph canvas, skipping HUD rows and the preview box. Colour and
/// weight escapes are only emitted when they change.
pub fn flush_canvas(
    canvas: &CellCanvas,
    show_hud: bool,
    preview: Option<PreviewRect>,
    use_truecolor: bool,
    stdout: &mut impl Write,
) -> io::Result<()> {
    let (cols, rows) = (canvas.cols(), canvas.rows());
    let mut row_buf = String::with_capacity(cols * 8 + 32);
    let mut last_fg: Option<[u8; 3]> = None;
    let mut last_weight = Weight::Normal;

    write_ansi_command(&mut row_buf, SetBackgroundColor(make_color(0, 0, 0, use_truecolor)))?;
    stdout.write_all(row_buf.as_bytes())?;

    for row in 0..rows {
        if is_hud_overlay_row(show_hud, row, rows) {
            continue;
        }
        row_buf.clear();
        write_ansi_command(&mut row_buf, cursor::MoveTo(0, row as u16))?;

        let mut col = 0;
        while col < cols {
            if let Some(rect) = preview.filter(|r| r.contains(col, row)) {
                let skip_to = rect.left + rect.cols;
                write_ansi_command(&mut row_buf, cursor::MoveToColumn(skip_to as u16))?;
                col = skip_to;
                continue;
            }
            let Some(cell) = canvas.cell(col, row) else {
                break;
            };
            let width = display_width(cell.glyph);
            let fits = col + width <= cols && !preview.is_some_and(|r| r.contains(col + width - 1, row));
            if cell.is_blank() || !fits {
                row_buf.push(' ');
                col += 1;
                continue;
            }

            let rgb = cell.rgb_u8();
            let weight = weight_for(cell.scale);
            if weight != last_weight {
                let attr = match weight {
                    Weight::Bold => Attribute::Bold,
                    Weight::Dim => Attribute::Dim,
                    Weight::Normal => Attribute::NormalIntensity,
                };
                if last_weight != Weight::Normal && weight != Weight::Normal {
                    write_ansi_command(&mut row_buf, SetAttribute(Attribute::NormalIntensity))?;
                }
                write_ansi_command(&mut row_buf, SetAttribute(attr))?;
                last_weight = weight;
            }
            if last_fg != Some(rgb) {
                write_ansi_command(
                    &mut row_buf,
                    SetForegroundColor(make_color(rgb[0], rgb[1], rgb[2], use_truecolor)),
                )?;
                last_fg = Some(rgb);
            }
            row_buf.push(cell.glyph);
            col += width;
        }
        stdout.write_all(row_buf.as_bytes())?;
    }

    if last_weight != Weight::Normal {
        queue!(stdout, SetAttribute(Attribute::NormalIntensity))?;
    }
    Ok(())
}

pub fn render_frame(
    app_state: &mut AppState,
    cfg: &RainConfig,
    preview_cells: &mut Vec<HalfblockCell>,
    stdout: &mut impl Write,
) -> io::Result<()> {
    let term_cols = app_state.canvas.cols();
    let term_rows = app_state.canvas.rows();

    let preview = if app_state.show_face {
        preview_rect(
            app_state.face.snapshot().dimensions(),
            term_cols,
            term_rows,
            app_state.show_hud,
        )
    } else {
        None
    };

    flush_canvas(
        &app_state.canvas,
        app_state.show_hud,
        preview,
        app_state.use_truecolor,
        stdout,
    )?;

    if let Some(rect) = preview {
        super::halfblock::downsample_image_into(app_state.face.snapshot(), rect.cols, rect.rows, preview_cells);
        super::halfblock::draw_cells(
            preview_cells,
            rect.cols,
            rect.rows,
            (rect.left as u16, rect.top as u16),
            app_state.use_truecolor,
            stdout,
        )?;
    }

    if app_state.show_hud {
        super::hud::draw_hud(app_state, cfg, term_cols as u16, term_rows as u16, stdout)?;
    }

    queue!(stdout, ResetColor)?;
    stdout.flush()
}

/// Advance every subsystem by one frame. Speech and source failures are
/// reported and the frame carries on.
pub fn step_frame(app_state: &mut AppState, cfg: &RainConfig, now: Instant, dt: f32) {
    if let Some(result) = app_state.speech.poll(now) {
        match result {
            Ok(outcome) => {
                app_state.set_status(format!(
                    "spoke {:.1}s via {}",
                    outcome.duration.as_secs_f32(),
                    outcome.method
                ));
            }
            Err(err) => {
                tracing::warn!(%err, "speech failed");
                app_state.set_status(format!("speech failed: {err}"));
            }
        }
    }

    app_state.face.drain(&app_state.viseme_rx, now);
    app_state.face.render(now);

    let (vw, vh) = app_state.canvas.viewport_px();
    app_state
        .sources
        .resize(vw as usize, vh as usize, &mut app_state.depth);
    let live = app_state
        .sources
        .is_live_face()
        .then(|| app_state.face.snapshot());
    app_state.sources.tick(now, live, &mut app_state.depth);

    if !app_state.paused {
        let mut rng = rand::rng();
        app_state
            .rain
            .frame(cfg, &app_state.depth, &mut app_state.canvas, dt, &mut rng);
    }
}

pub fn run_app_loop(
    app_state: &mut AppState,
    input_rx: &InputReceiver,
    stdout: &mut io::BufWriter<io::Stdout>,
) -> AppResult<()> {
    let mut preview_cells: Vec<HalfblockCell> = Vec::new();

    loop {
        let frame_start = Instant::now();

        // Drain all pending input events -- never skip
        if crate::input::drain_input_events(app_state, input_rx)? {
            break;
        }

        let now = Instant::now();
        let delta_time = now
            .duration_since(app_state.last_frame_time)
            .as_secs_f32()
            .max(1e-6);
        app_state.last_frame_time = now;

        let cfg = app_state.config.clone();

        let (cols, rows) = terminal::size()?;
        if app_state.canvas.resize(cols.max(1) as usize, rows.max(1) as usize) {
            app_state.rain.invalidate();
            queue!(stdout, terminal::Clear(terminal::ClearType::All))?;
        }

        step_frame(app_state, &cfg, now, delta_time);
        render_frame(app_state, &cfg, &mut preview_cells, stdout)?;

        app_state.frame_count += 1;
        let instant_fps = 1.0 / delta_time;
        app_state.fps = if app_state.fps <= 0.01 {
            instant_fps
        } else {
            0.90 * app_state.fps + 0.10 * instant_fps
        };

        let spent = frame_start.elapsed();
        if spent < FRAME_TARGET {
            std::thread::sleep(FRAME_TARGET - spent);
        }
    }

    if app_state.speech.is_playing() {
        app_state.speech.stop(Instant::now());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::test_support::make_state;
    use std::time::Duration;

    #[test]
    fn weights_follow_scale_thresholds() {
        assert_eq!(weight_for(1.15), Weight::Bold);
        assert_eq!(weight_for(1.0), Weight::Normal);
        assert_eq!(weight_for(0.85), Weight::Dim);
    }

    #[test]
    fn preview_sits_bottom_right_above_hud() {
        let rect = preview_rect((256, 320), 120, 40, true).expect("fits");
        assert_eq!(rect.cols, 30);
        assert_eq!(rect.left + rect.cols, 120);
        assert_eq!(rect.top + rect.rows, 39);
        assert!(preview_rect((256, 320), 12, 6, true).is_none());
    }

    #[test]
    fn flush_skips_hud_rows_and_wide_overflow() {
        let mut canvas = CellCanvas::new(3, 3);
        canvas.draw_glyph('a', 0.0, 16.0, 1.0, [0, 255, 0], 1.0);
        canvas.draw_glyph('舍', 16.0, 16.0, 1.2, [0, 255, 0], 1.0);
        canvas.draw_glyph('z', 0.0, 0.0, 1.0, [0, 255, 0], 1.0);
        let mut out = Vec::new();
        flush_canvas(&canvas, true, None, true, &mut out).expect("flush");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains('a'));
        assert!(!text.contains('z'), "HUD row must be left alone");
        // The wide glyph would spill past the last column.
        assert!(!text.contains('舍'));
    }

    #[test]
    fn frames_animate_rain_and_face() {
        let mut app = make_state();
        let cfg = app.config.clone();
        let t0 = Instant::now();
        app.speech.speak("hello there", t0).expect("speak accepted");
        for i in 0..40 {
            step_frame(&mut app, &cfg, t0 + Duration::from_millis(i * 40), 0.04);
        }
        assert!(!app.rain.columns().is_empty());
        assert!(app.face.last_viseme().is_some());

        let mut out = Vec::new();
        let mut cells = Vec::new();
        render_frame(&mut app, &cfg, &mut cells, &mut out).expect("render");
        assert!(!out.is_empty());
    }

    #[test]
    fn paused_rain_leaves_canvas_alone() {
        let mut app = make_state();
        app.paused = true;
        let cfg = app.config.clone();
        step_frame(&mut app, &cfg, Instant::now(), 0.016);
        assert!(app.rain.columns().is_empty());
    }
}
