use log::debug;

use bridge::memory::{BYTES_PER_PIXEL, ROW_STRIDE, SCREEN_HEIGHT, SCREEN_WIDTH};
use bridge::SharedFrameBuffer;

/// RGBA, in display memory byte order.
pub type Color = [u8; 4];

pub const fn rgb(r: u8, g: u8, b: u8) -> Color {
    [r, g, b, 0xff]
}

pub const WHITE: Color = rgb(255, 255, 255);

const fn widen5(value: u16) -> u8 {
    let value = (value & 0x1f) as u8;
    (value << 3) | (value >> 2)
}

/// Expands a 16-bit high color (A1 R5 G5 B5) to RGBA. A set top bit marks a
/// transparent pixel, as in the calculator's own grob data.
pub const fn high_color(color: u16) -> Color {
    let alpha = if color & 0x8000 != 0 { 0 } else { 0xff };
    [widen5(color >> 10), widen5(color >> 5), widen5(color), alpha]
}

/*
 * An off-screen graphic, the calculator's GROB: drawn once, then blitted onto
 * the screen at any size. Pixels with zero alpha are skipped by `blit`.
 */
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grob {
    width: usize,
    height: usize,
    pixels: Vec<Color>,
}

impl Grob {
    /// DIMGROB with a fill color.
    pub fn new(width: usize, height: usize, color: Color) -> Grob {
        Grob { width, height, pixels: vec![color; width * height] }
    }

    /// DIMGROB from high color data, one `u16` per pixel, row-major.
    pub fn from_high_color(width: usize, height: usize, data: &[u16]) -> Option<Grob> {
        if width == 0 || height == 0 || data.len() != width * height {
            return None;
        }
        Some(Grob { width, height, pixels: data.iter().map(|c| high_color(*c)).collect() })
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[y * self.width + x])
    }
}

/*
 * Drawing primitives over display memory. Everything is clipped to the
 * screen, so callers can draw partly (or entirely) off it.
 */
pub struct Canvas<'a> {
    display: &'a SharedFrameBuffer,
    row: Vec<u8>,
    pixels_written: u64,
}

impl<'a> Canvas<'a> {
    pub fn new(display: &'a SharedFrameBuffer) -> Self {
        Canvas {
            display,
            row: Vec::with_capacity(ROW_STRIDE),
            pixels_written: 0,
        }
    }

    pub fn pixels_written(&self) -> u64 {
        self.pixels_written
    }

    // One horizontal run of pixels, already clipped
    fn span(&mut self, x: usize, y: usize, len: usize, color: Color) {
        self.row.clear();
        for _ in 0..len {
            self.row.extend_from_slice(&color);
        }
        let offset = y * ROW_STRIDE + x * BYTES_PER_PIXEL;
        match self.display.write_region(offset, &self.row) {
            Ok(()) => self.pixels_written += len as u64,
            Err(e) => debug!("Dropped span: {}", e),
        }
    }

    pub fn clear(&mut self, color: Color) {
        self.fill_rect(0, 0, SCREEN_WIDTH as i32, SCREEN_HEIGHT as i32, color);
    }

    pub fn plot(&mut self, x: i32, y: i32, color: Color) {
        if x < 0 || y < 0 || x >= SCREEN_WIDTH as i32 || y >= SCREEN_HEIGHT as i32 {
            return;
        }
        self.span(x as usize, y as usize, 1, color);
    }

    pub fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: Color) {
        let left = x.max(0);
        let top = y.max(0);
        let right = x.saturating_add(w).min(SCREEN_WIDTH as i32);
        let bottom = y.saturating_add(h).min(SCREEN_HEIGHT as i32);
        if left >= right || top >= bottom {
            return;
        }
        for row in top..bottom {
            self.span(left as usize, row as usize, (right - left) as usize, color);
        }
    }

    pub fn draw_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: Color) {
        if w <= 0 || h <= 0 {
            return;
        }
        self.fill_rect(x, y, w, 1, color);
        self.fill_rect(x, y + h - 1, w, 1, color);
        self.fill_rect(x, y, 1, h, color);
        self.fill_rect(x + w - 1, y, 1, h, color);
    }

    /// Midpoint circle outline.
    pub fn draw_circle(&mut self, cx: i32, cy: i32, r: i32, color: Color) {
        if r < 0 {
            return;
        }
        let mut f = 1 - r;
        let mut ddf_x = 1;
        let mut ddf_y = -2 * r;
        let (mut x, mut y) = (0, r);

        self.plot(cx, cy + r, color);
        self.plot(cx, cy - r, color);
        self.plot(cx + r, cy, color);
        self.plot(cx - r, cy, color);
        while x < y {
            if f >= 0 {
                y -= 1;
                ddf_y += 2;
                f += ddf_y;
            }
            x += 1;
            ddf_x += 2;
            f += ddf_x;

            for (px, py) in [(x, y), (y, x)] {
                self.plot(cx + px, cy + py, color);
                self.plot(cx - px, cy + py, color);
                self.plot(cx + px, cy - py, color);
                self.plot(cx - px, cy - py, color);
            }
        }
    }

    /// Filled disc, one span per row.
    pub fn fill_circle(&mut self, cx: i32, cy: i32, r: i32, color: Color) {
        if r < 0 {
            return;
        }
        for dy in -r..=r {
            let mut half = 0;
            while (half + 1) * (half + 1) + dy * dy <= r * r {
                half += 1;
            }
            self.fill_rect(cx - half, cy + dy, 2 * half + 1, 1, color);
        }
    }

    /// BLIT: draws `grob` scaled to `w` x `h` with its top-left at (x, y),
    /// nearest neighbour. Transparent pixels leave the screen untouched.
    pub fn blit(&mut self, x: i32, y: i32, w: i32, h: i32, grob: &Grob) {
        if w <= 0 || h <= 0 {
            return;
        }
        let left = x.max(0);
        let right = x.saturating_add(w).min(SCREEN_WIDTH as i32);
        let top = y.max(0);
        let bottom = y.saturating_add(h).min(SCREEN_HEIGHT as i32);

        for row in top..bottom {
            let src_y = ((row - y) as usize * grob.height) / h as usize;
            let mut run_start = None;
            for col in left..=right {
                let color = if col < right {
                    let src_x = ((col - x) as usize * grob.width) / w as usize;
                    grob.pixel(src_x, src_y).filter(|c| c[3] != 0)
                } else {
                    None
                };
                match (color, run_start) {
                    (Some(color), None) => {
                        self.row.clear();
                        self.row.extend_from_slice(&color);
                        run_start = Some(col);
                    }
                    (Some(color), Some(_)) => self.row.extend_from_slice(&color),
                    (None, Some(start)) => {
                        let offset = row as usize * ROW_STRIDE + start as usize * BYTES_PER_PIXEL;
                        match self.display.write_region(offset, &self.row) {
                            Ok(()) => self.pixels_written += (col - start) as u64,
                            Err(e) => debug!("Dropped blit run: {}", e),
                        }
                        run_start = None;
                    }
                    (None, None) => {}
                }
            }
        }
    }

    /// Bresenham.
    pub fn draw_line(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, color: Color) {
        let dx = (x2 - x1).abs();
        let dy = -(y2 - y1).abs();
        let sx = if x1 < x2 { 1 } else { -1 };
        let sy = if y1 < y2 { 1 } else { -1 };
        let mut error = dx + dy;
        let (mut x, mut y) = (x1, y1);

        loop {
            self.plot(x, y, color);
            if x == x2 && y == y2 {
                break;
            }
            let e2 = 2 * error;
            if e2 >= dy {
                error += dy;
                x += sx;
            }
            if e2 <= dx {
                error += dx;
                y += sy;
            }
        }
    }
}
