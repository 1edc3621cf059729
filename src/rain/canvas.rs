// --- Cell canvas ---

/// Virtual pixels covered by one terminal cell.
pub const CELL_PX_W: f32 = 8.0;
pub const CELL_PX_H: f32 = 16.0;

/// Cells dimmer than this (max channel) are cleared by the fade pass.
const VISIBLE_FLOOR: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub glyph: char,
    pub rgb: [f32; 3],
    pub scale: f32,
}

impl Cell {
    pub const BLANK: Cell = Cell {
        glyph: ' ',
        rgb: [0.0; 3],
        scale: 1.0,
    };

    pub fn is_blank(&self) -> bool {
        self.glyph == ' '
    }

    pub fn rgb_u8(&self) -> [u8; 3] {
        [
            self.rgb[0].round().clamp(0.0, 255.0) as u8,
            self.rgb[1].round().clamp(0.0, 255.0) as u8,
            self.rgb[2].round().clamp(0.0, 255.0) as u8,
        ]
    }
}

/// Persistent glyph surface. Trails come from fading instead of clearing.
#[derive(Debug, Clone)]
pub struct CellCanvas {
    cols: usize,
    rows: usize,
    cells: Vec<Cell>,
}

impl CellCanvas {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            cells: vec![Cell::BLANK; cols.saturating_mul(rows)],
        }
    }

    /// Returns true when the grid changed size (contents are cleared).
    pub fn resize(&mut self, cols: usize, rows: usize) -> bool {
        if self.cols == cols && self.rows == rows {
            return false;
        }
        self.cols = cols;
        self.rows = rows;
        self.cells.clear();
        self.cells.resize(cols.saturating_mul(rows), Cell::BLANK);
        true
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn viewport_px(&self) -> (f32, f32) {
        (self.cols as f32 * CELL_PX_W, self.rows as f32 * CELL_PX_H)
    }

    pub fn cell(&self, col: usize, row: usize) -> Option<&Cell> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        self.cells.get(row * self.cols + col)
    }

    /// Translucent black over everything.
    pub fn fade(&mut self, alpha: f32) {
        let keep = 1.0 - alpha.clamp(0.0, 1.0);
        for cell in &mut self.cells {
            if cell.is_blank() {
                continue;
            }
            for c in &mut cell.rgb {
                *c *= keep;
            }
            if cell.rgb.iter().fold(0.0f32, |m, &c| m.max(c)) < VISIBLE_FLOOR {
                *cell = Cell::BLANK;
            }
        }
    }

    /// Alpha-blend a glyph at a virtual pixel position. `scale` is the local
    /// font size relative to the configured one.
    pub fn draw_glyph(&mut self, glyph: char, x: f32, y: f32, scale: f32, rgb: [u8; 3], alpha: f32) {
        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
            return;
        }
        let col = (x / CELL_PX_W) as usize;
        let row = (y / CELL_PX_H) as usize;
        if col >= self.cols || row >= self.rows {
            return;
        }
        let a = alpha.clamp(0.0, 1.0);
        let cell = &mut self.cells[row * self.cols + col];
        for (dst, src) in cell.rgb.iter_mut().zip(rgb) {
            *dst = *dst * (1.0 - a) + src as f32 * a;
        }
        cell.glyph = glyph;
        cell.scale = scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_maps_pixels_to_cells() {
        let mut canvas = CellCanvas::new(4, 2);
        canvas.draw_glyph('x', 17.0, 20.0, 1.0, [255, 0, 0], 1.0);
        let cell = canvas.cell(2, 1).expect("cell in range");
        assert_eq!(cell.glyph, 'x');
        assert_eq!(cell.rgb_u8(), [255, 0, 0]);
        canvas.draw_glyph('y', 100.0, 0.0, 1.0, [255, 0, 0], 1.0);
        canvas.draw_glyph('z', -1.0, 0.0, 1.0, [255, 0, 0], 1.0);
        assert!(canvas.cell(0, 0).expect("cell").is_blank());
    }

    #[test]
    fn fade_dims_then_clears() {
        let mut canvas = CellCanvas::new(1, 1);
        canvas.draw_glyph('x', 0.0, 0.0, 1.0, [200, 200, 200], 1.0);
        canvas.fade(0.5);
        assert_eq!(canvas.cell(0, 0).expect("cell").rgb_u8(), [100, 100, 100]);
        for _ in 0..10 {
            canvas.fade(0.5);
        }
        assert!(canvas.cell(0, 0).expect("cell").is_blank());
    }

    #[test]
    fn partial_alpha_blends_over_existing() {
        let mut canvas = CellCanvas::new(1, 1);
        canvas.draw_glyph('a', 0.0, 0.0, 1.0, [100, 0, 0], 1.0);
        canvas.draw_glyph('b', 0.0, 0.0, 1.2, [0, 200, 0], 0.5);
        let cell = canvas.cell(0, 0).expect("cell");
        assert_eq!(cell.glyph, 'b');
        assert_eq!(cell.rgb_u8(), [50, 100, 0]);
        assert_eq!(cell.scale, 1.2);
    }

    #[test]
    fn resize_reports_change() {
        let mut canvas = CellCanvas::new(2, 2);
        assert!(!canvas.resize(2, 2));
        assert!(canvas.resize(3, 2));
        assert_eq!(canvas.viewport_px(), (24.0, 32.0));
    }
}
