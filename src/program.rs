use std::thread;
use std::time::Duration;

use bridge::memory::{SCREEN_HEIGHT, SCREEN_WIDTH};
use bridge::{EmulationCore, SharedFrameBuffer, StepResult};

use crate::graphics::{high_color, rgb, Canvas, Color, Grob, WHITE};

/// Pause between frames, like the program's `DELAY` call.
pub const FRAME_DELAY: Duration = Duration::from_millis(16);

const BACKGROUND: Color = rgb(0, 0, 63);
const SPRITE_HIGH_COLOR: u16 = 0x7e00;
const SPRITE: Color = high_color(SPRITE_HIGH_COLOR);
const TRANSPARENT: u16 = 0x8000;
const SPRITE_WIDTH: i32 = 20;
const SPRITE_HEIGHT: i32 = 40;
// The sprite grob is drawn at half size and blitted at double
const GROB_WIDTH: usize = 10;
const GROB_HEIGHT: usize = 20;
const PALETTE_HEIGHT: i32 = 12;
const BALL: Color = rgb(0, 128, 255);
const BALL_CENTER: (i32, i32) = (160, 130);

const WIDTH: i32 = SCREEN_WIDTH as i32;
const HEIGHT: i32 = SCREEN_HEIGHT as i32;

// Orange block with its corners cut out
fn sprite_grob() -> Grob {
    let mut data = vec![SPRITE_HIGH_COLOR; GROB_WIDTH * GROB_HEIGHT];
    for corner in [0, GROB_WIDTH - 1, data.len() - GROB_WIDTH, data.len() - 1] {
        data[corner] = TRANSPARENT;
    }
    Grob::from_high_color(GROB_WIDTH, GROB_HEIGHT, &data)
        .unwrap_or_else(|| Grob::new(GROB_WIDTH, GROB_HEIGHT, SPRITE))
}

/*
 * A stand-in for the calculator running a user program: clears the screen
 * to dark blue, draws a palette strip and a pulsing ball, and bounces an
 * orange block around leaving a sweeping line behind it. One step is one
 * frame. The cycles it reports are pixels written.
 */
pub struct DemoProgram {
    sprite: Grob,
    frame: u64,
    x: i32,
    y: i32,
    dx: i32,
    dy: i32,
    delay: Duration,
}

impl DemoProgram {
    pub fn new() -> DemoProgram {
        DemoProgram::with_delay(FRAME_DELAY)
    }

    pub fn with_delay(delay: Duration) -> DemoProgram {
        DemoProgram { sprite: sprite_grob(), frame: 0, x: 40, y: 60, dx: 3, dy: 2, delay }
    }

    pub fn sprite_position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    fn advance(&mut self) {
        self.x += self.dx;
        self.y += self.dy;
        if self.x <= 0 || self.x + SPRITE_WIDTH >= WIDTH {
            self.dx = -self.dx;
            self.x = self.x.clamp(0, WIDTH - SPRITE_WIDTH);
        }
        if self.y <= PALETTE_HEIGHT || self.y + SPRITE_HEIGHT >= HEIGHT {
            self.dy = -self.dy;
            self.y = self.y.clamp(PALETTE_HEIGHT, HEIGHT - SPRITE_HEIGHT);
        }
    }

    fn draw(&self, canvas: &mut Canvas) {
        canvas.clear(BACKGROUND);

        let shift = (self.frame % 256) as i32;
        for x in 0..WIDTH {
            let hue = ((x * 256 / WIDTH + shift) % 256) as u8;
            canvas.fill_rect(x, 0, 1, PALETTE_HEIGHT, rgb(hue, 255 - hue, 128));
        }

        let sweep = (self.frame % WIDTH as u64) as i32;
        canvas.draw_line(sweep, PALETTE_HEIGHT, WIDTH - 1 - sweep, HEIGHT - 1, WHITE);

        let radius = 8 + (self.frame % 16) as i32;
        let (cx, cy) = BALL_CENTER;
        canvas.fill_circle(cx, cy, radius, BALL);
        canvas.draw_circle(cx, cy, radius, WHITE);

        canvas.blit(self.x, self.y, SPRITE_WIDTH, SPRITE_HEIGHT, &self.sprite);
        canvas.draw_rect(self.x, self.y, SPRITE_WIDTH, SPRITE_HEIGHT, WHITE);
    }
}

impl Default for DemoProgram {
    fn default() -> Self {
        DemoProgram::new()
    }
}

impl EmulationCore for DemoProgram {
    fn step(&mut self, display: &SharedFrameBuffer) -> StepResult {
        let mut canvas = Canvas::new(display);
        self.draw(&mut canvas);
        display.publish();

        self.advance();
        self.frame += 1;
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        StepResult::running(canvas.pixels_written())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bridge::memory::{BYTES_PER_PIXEL, ROW_STRIDE};
    use bridge::{BufferMode, StepStatus};

    fn pixel(frame: &[u8], x: usize, y: usize) -> [u8; 4] {
        let offset = y * ROW_STRIDE + x * BYTES_PER_PIXEL;
        [frame[offset], frame[offset + 1], frame[offset + 2], frame[offset + 3]]
    }

    #[test]
    fn first_frame_is_published() {
        let display = SharedFrameBuffer::new(BufferMode::Double);
        let mut program = DemoProgram::with_delay(Duration::ZERO);
        let (x, y) = program.sprite_position();

        let result = program.step(&display);
        assert_eq!(result.status, StepStatus::Continue);
        assert!(result.cycles >= (SCREEN_WIDTH * SCREEN_HEIGHT) as u64);

        let frame = display.graphic_memory();
        assert_eq!(pixel(&frame, x as usize + 5, y as usize + 5), SPRITE);
        assert_eq!(pixel(&frame, x as usize, y as usize), WHITE);
        assert_eq!(pixel(&frame, 300, 200), BACKGROUND);
        assert_eq!(pixel(&frame, 160, 130), BALL);
        assert_eq!(SPRITE, [0xff, 0x84, 0, 0xff]);
    }

    #[test]
    fn sprite_stays_on_screen() {
        let display = SharedFrameBuffer::new(BufferMode::Single);
        let mut program = DemoProgram::with_delay(Duration::ZERO);
        for _ in 0..500 {
            program.step(&display);
            let (x, y) = program.sprite_position();
            assert!(x >= 0 && x + SPRITE_WIDTH <= WIDTH);
            assert!(y >= PALETTE_HEIGHT && y + SPRITE_HEIGHT <= HEIGHT);
        }
    }
}
