use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError};
use log::{info, warn};
use minifb::{Key, KeyRepeat, Scale, Window, WindowOptions};

use bridge::memory::{BYTES_PER_PIXEL, GRAPHIC_MEMORY_SIZE, ROW_STRIDE, SCREEN_HEIGHT, SCREEN_WIDTH};
use bridge::{
    image_channel, Cadence, DisplayBridge, EmulationDriver, FramePresenter, MutableTexture,
    ReadbackPresenter, RefreshClock, Surface, SurfaceError, TickGate,
};

pub type FrontendResult = Result<(), Box<dyn Error>>;

const TITLE: &str = "prime-display";

// How long the UI loop waits for a tick before pumping window events anyway
const IDLE_POLL: Duration = Duration::from_millis(50);

pub struct WindowConfig {
    pub scale: Scale,
    pub cadence: Cadence,
}

/// minifb wants 0RGB words, display memory is RGBA bytes.
pub fn to_0rgb(rgba: &[u8], out: &mut [u32]) {
    for (pixel, word) in rgba.chunks_exact(BYTES_PER_PIXEL).zip(out.iter_mut()) {
        *word = u32::from(pixel[0]) << 16 | u32::from(pixel[1]) << 8 | u32::from(pixel[2]);
    }
}

pub fn scale_for(factor: u32) -> Option<Scale> {
    match factor {
        1 => Some(Scale::X1),
        2 => Some(Scale::X2),
        4 => Some(Scale::X4),
        8 => Some(Scale::X8),
        _ => None,
    }
}

fn open_window(scale: Scale) -> Result<Window, minifb::Error> {
    Window::new(
        &format!("{} - ESC to exit, P to pause", TITLE),
        SCREEN_WIDTH,
        SCREEN_HEIGHT,
        WindowOptions { scale, ..WindowOptions::default() },
    )
}

fn keep_running(window: &Window) -> bool {
    window.is_open() && !window.is_key_down(Key::Escape)
}

/*
 * The window itself as the surface: the presenter writes RGBA into the
 * staging bytes and `submit` pushes them to the screen. Only usable on the
 * thread that owns the window.
 */
pub struct WindowSurface {
    window: Window,
    rgba: Vec<u8>,
    pixels: Vec<u32>,
}

impl WindowSurface {
    pub fn new(window: Window) -> WindowSurface {
        WindowSurface {
            window,
            rgba: vec![0; GRAPHIC_MEMORY_SIZE],
            pixels: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut Window {
        &mut self.window
    }
}

impl Surface for WindowSurface {
    fn size(&self) -> (usize, usize) {
        (SCREEN_WIDTH, SCREEN_HEIGHT)
    }

    fn bytes_per_row(&self) -> usize {
        ROW_STRIDE
    }

    fn pixel_data_mut(&mut self) -> Result<&mut [u8], SurfaceError> {
        if !self.window.is_open() {
            return Err(SurfaceError::Detached);
        }
        Ok(&mut self.rgba)
    }

    fn submit(&mut self) -> Result<(), SurfaceError> {
        to_0rgb(&self.rgba, &mut self.pixels);
        self.window
            .update_with_buffer(&self.pixels, SCREEN_WIDTH, SCREEN_HEIGHT)
            .map_err(|e| SurfaceError::Backend(e.to_string()))
    }
}

/// Pause key and the once-a-second title refresh, shared by both strategies.
struct Controls {
    last_title_update: Instant,
}

impl Controls {
    fn new() -> Controls {
        Controls { last_title_update: Instant::now() }
    }

    fn handle(&mut self, window: &mut Window, bridge: &DisplayBridge) {
        let driver = bridge.driver();
        if window.is_key_pressed(Key::P, KeyRepeat::No) {
            if driver.is_paused() {
                driver.unpause();
                info!("Resumed");
            } else {
                driver.pause();
                info!("Paused");
            }
        }

        // Only update the title every one second or so
        if self.last_title_update.elapsed() >= Duration::from_secs(1) {
            window.set_title(&status_title(
                driver.megahertz(),
                bridge.clock().dropped_ticks(),
                driver.is_paused(),
            ));
            self.last_title_update = Instant::now();
        }
    }
}

/// The demo program counts pixels drawn as its cycles, so the driver's
/// million-cycles-per-second figure is megapixels per second.
fn status_title(megapixels: f64, dropped_ticks: u64, paused: bool) -> String {
    let paused = if paused { " - Paused" } else { "" };
    format!(
        "{} - {:.2} Mpx/s drawn - {} ticks dropped{}",
        TITLE, megapixels, dropped_ticks, paused
    )
}

/*
 * Strategy 1. The clock thread only signals; the presenter lives on the UI
 * thread with the window and uploads display memory straight into it. Ticks
 * that arrive while a frame is still being presented are dropped at the gate.
 */
pub fn run_direct(driver: EmulationDriver, config: WindowConfig) -> FrontendResult {
    let (display, _) = driver.display_memory();
    let window = open_window(config.scale)?;
    let mut presenter = FramePresenter::new(display, WindowSurface::new(window))?;

    let gate = Arc::new(TickGate::default());
    let (tick_sender, ticks) = bounded::<()>(1);
    let clock = {
        let gate = gate.clone();
        RefreshClock::new(config.cadence, move || {
            if gate.try_acquire() && tick_sender.try_send(()).is_err() {
                gate.release();
            }
        })
    };

    let bridge = DisplayBridge::new(driver, clock);
    bridge.start()?;
    bridge.view_did_appear()?;

    let mut controls = Controls::new();
    while keep_running(presenter.surface().window()) {
        match ticks.recv_timeout(IDLE_POLL) {
            Ok(()) => {
                presenter.present_frame();
                gate.release();
            }
            Err(RecvTimeoutError::Timeout) => presenter.surface_mut().window_mut().update(),
            Err(RecvTimeoutError::Disconnected) => break,
        }
        controls.handle(presenter.surface_mut().window_mut(), &bridge);
    }

    bridge.view_will_disappear();
    let stats = presenter.stats();
    info!(
        "Presented {} frames, skipped {}, {} ticks dropped at the gate",
        stats.presented,
        stats.skipped,
        gate.dropped()
    );
    bridge.shutdown();
    Ok(())
}

/*
 * Strategy 2. The clock thread presents into an off-screen texture, reads it
 * back and posts the bitmap; the UI loop shows whatever image is newest.
 */
pub fn run_readback(driver: EmulationDriver, config: WindowConfig) -> FrontendResult {
    let (display, _) = driver.display_memory();
    let mut window = open_window(config.scale)?;
    let hz = (1.0 / config.cadence.period().as_secs_f64()).round() as usize;
    window.set_target_fps(hz.max(1));

    let (sink, mut view) = image_channel();
    let presenter =
        ReadbackPresenter::new(display, MutableTexture::new(SCREEN_WIDTH, SCREEN_HEIGHT), sink)?;
    let bridge = DisplayBridge::new(driver, RefreshClock::driving(config.cadence, presenter));
    bridge.start()?;
    bridge.view_did_appear()?;

    let mut pixels = vec![0u32; SCREEN_WIDTH * SCREEN_HEIGHT];
    let mut shown = 0;
    let mut controls = Controls::new();
    while keep_running(&window) {
        view.refresh();
        if view.received() != shown {
            shown = view.received();
            if let Some(image) = view.image() {
                to_0rgb(image.pixels(), &mut pixels);
            }
            if let Err(e) = window.update_with_buffer(&pixels, SCREEN_WIDTH, SCREEN_HEIGHT) {
                warn!("Could not show frame: {}", e);
            }
        } else {
            window.update();
        }
        controls.handle(&mut window, &bridge);
    }

    bridge.view_will_disappear();
    info!(
        "Showed {} images, {} ticks dropped",
        view.received(),
        bridge.clock().dropped_ticks()
    );
    bridge.shutdown();
    Ok(())
}
