use crossterm::{
    cursor,
    style::{SetBackgroundColor, SetForegroundColor},
    Command,
};
use image::RgbaImage;
use std::io::{self, Write};

use super::{make_color, HalfblockCell, HALF_BLOCK};
use crate::math::over_black;

// --- Downsample ---

/// Area-average `img` into `cols x rows` half-block cells. Each cell holds
/// the top half (background) and bottom half (foreground) colours.
pub fn downsample_image_into(img: &RgbaImage, cols: usize, rows: usize, out: &mut Vec<HalfblockCell>) {
    out.clear();
    out.resize(cols * rows, ([0u8; 3], [0u8; 3]));
    let (w, h) = (img.width() as usize, img.height() as usize);
    if w == 0 || h == 0 || cols == 0 || rows == 0 {
        return;
    }
    let sub_rows = rows * 2;

    let average = |x0: usize, x1: usize, y0: usize, y1: usize| -> [u8; 3] {
        let (mut r, mut g, mut b, mut n) = (0u32, 0u32, 0u32, 0u32);
        for y in y0..y1 {
            for x in x0..x1 {
                let p = over_black(*img.get_pixel(x as u32, y as u32));
                r += p[0] as u32;
                g += p[1] as u32;
                b += p[2] as u32;
                n += 1;
            }
        }
        if n == 0 {
            return [0, 0, 0];
        }
        [(r / n) as u8, (g / n) as u8, (b / n) as u8]
    };

    // Source span for target index `i` of `n`; never empty.
    let span = |i: usize, n: usize, len: usize| -> (usize, usize) {
        let start = (i * len / n).min(len - 1);
        let end = ((i + 1) * len / n).clamp(start + 1, len);
        (start, end)
    };

    for row in 0..rows {
        let (ty0, ty1) = span(row * 2, sub_rows, h);
        let (by0, by1) = span(row * 2 + 1, sub_rows, h);
        for col in 0..cols {
            let (x0, x1) = span(col, cols, w);
            out[row * cols + col] = (average(x0, x1, ty0, ty1), average(x0, x1, by0, by1));
        }
    }
}

/// Preview size in cells for a `max_cols` wide box, keeping the image
/// aspect (one cell is one pixel wide and two tall).
pub fn preview_size(img_w: u32, img_h: u32, max_cols: usize, max_rows: usize) -> (usize, usize) {
    if img_w == 0 || img_h == 0 || max_cols == 0 || max_rows == 0 {
        return (0, 0);
    }
    let aspect = img_h as f32 / img_w as f32;
    let mut cols = max_cols;
    let mut rows = ((cols as f32 * aspect) / 2.0).round().max(1.0) as usize;
    if rows > max_rows {
        rows = max_rows;
        cols = ((rows as f32 * 2.0 / aspect).round() as usize).clamp(1, max_cols);
    }
    (cols, rows)
}

fn write_ansi_command(buf: &mut String, command: impl Command) -> io::Result<()> {
    command
        .write_ansi(buf)
        .map_err(|_| io::Error::other("failed to encode ANSI command"))
}

/// Draw prepared cells with their top-left at terminal `(left, top)`.
pub fn draw_cells(
    cells: &[HalfblockCell],
    cols: usize,
    rows: usize,
    (left, top): (u16, u16),
    use_truecolor: bool,
    stdout: &mut impl Write,
) -> io::Result<()> {
    let mut row_buf = String::with_capacity(cols * 24 + 16);
    for row in 0..rows {
        let mut last_bg: Option<[u8; 3]> = None;
        let mut last_fg: Option<[u8; 3]> = None;
        row_buf.clear();
        write_ansi_command(&mut row_buf, cursor::MoveTo(left, top + row as u16))?;
        for &(bg, fg) in &cells[row * cols..(row + 1) * cols] {
            if last_bg != Some(bg) {
                write_ansi_command(
                    &mut row_buf,
                    SetBackgroundColor(make_color(bg[0], bg[1], bg[2], use_truecolor)),
                )?;
                last_bg = Some(bg);
            }
            if last_fg != Some(fg) {
                write_ansi_command(
                    &mut row_buf,
                    SetForegroundColor(make_color(fg[0], fg[1], fg[2], use_truecolor)),
                )?;
                last_fg = Some(fg);
            }
            row_buf.push(HALF_BLOCK);
        }
        stdout.write_all(row_buf.as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn downsample_splits_top_and_bottom_halves() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        for y in 2..4 {
            for x in 0..4 {
                img.put_pixel(x, y, Rgba([200, 100, 50, 255]));
            }
        }
        let mut cells = Vec::new();
        downsample_image_into(&img, 2, 1, &mut cells);
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0], ([0, 0, 0], [200, 100, 50]));
    }

    #[test]
    fn downsample_averages_area() {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([200, 200, 200, 255]));
        let mut cells = Vec::new();
        downsample_image_into(&img, 1, 1, &mut cells);
        assert_eq!(cells[0].0, [100, 100, 100]);
        assert_eq!(cells[0].1, [0, 0, 0]);
    }

    #[test]
    fn upsampling_never_reads_empty_spans() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([90, 90, 90, 255]));
        let mut cells = Vec::new();
        downsample_image_into(&img, 8, 8, &mut cells);
        assert!(cells.iter().all(|&(t, b)| t == [90; 3] && b == [90; 3]));
    }

    #[test]
    fn preview_keeps_aspect() {
        assert_eq!(preview_size(256, 320, 20, 40), (20, 13));
        let (cols, rows) = preview_size(256, 320, 40, 10);
        assert_eq!(rows, 10);
        assert_eq!(cols, 16);
        assert_eq!(preview_size(0, 10, 5, 5), (0, 0));
    }

    #[test]
    fn draw_emits_one_block_per_cell() {
        let cells = vec![([1, 2, 3], [4, 5, 6]); 6];
        let mut out = Vec::new();
        draw_cells(&cells, 3, 2, (1, 1), true, &mut out).expect("draw");
        let text = String::from_utf8(out).expect("utf8");
        assert_eq!(text.matches(HALF_BLOCK).count(), 6);
    }
}
