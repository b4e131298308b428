use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, info, warn};

use crate::display_memory::DisplayMemory;
use crate::error::{BridgeError, SurfaceError};
use crate::memory::{GRAPHIC_MEMORY_SIZE, ROW_STRIDE, SCREEN_HEIGHT, SCREEN_WIDTH};
use crate::texture::{Bitmap, Readback, Surface};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    Skipped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PresentStats {
    pub presented: u64,
    pub skipped: u64,
}

/// Anything the refresh clock can drive once per tick.
pub trait Present {
    fn present_frame(&mut self) -> PresentStatus;
}

/*
 * Strategy 1: copy display RAM straight into a mutable texture that is bound
 * to what the view displays, then submit it.
 */
pub struct FramePresenter<S: Surface> {
    memory: Arc<dyn DisplayMemory>,
    surface: S,
    // Only used when the surface pads its rows
    staging: Vec<u8>,
    stats: PresentStats,
    failing: bool,
}

impl<S: Surface> FramePresenter<S> {
    pub fn new(memory: Arc<dyn DisplayMemory>, surface: S) -> Result<Self, BridgeError> {
        if memory.len() != GRAPHIC_MEMORY_SIZE {
            return Err(BridgeError::BufferSizeMismatch {
                expected: GRAPHIC_MEMORY_SIZE,
                actual: memory.len(),
            });
        }
        let (width, height) = surface.size();
        if (width, height) != (SCREEN_WIDTH, SCREEN_HEIGHT) {
            return Err(BridgeError::SurfaceSizeMismatch {
                width,
                height,
                expected_width: SCREEN_WIDTH,
                expected_height: SCREEN_HEIGHT,
            });
        }
        if surface.bytes_per_row() < ROW_STRIDE {
            return Err(BridgeError::StrideTooSmall {
                minimum: ROW_STRIDE,
                actual: surface.bytes_per_row(),
            });
        }

        let staging = if surface.bytes_per_row() == ROW_STRIDE {
            Vec::new()
        } else {
            vec![0; GRAPHIC_MEMORY_SIZE]
        };

        Ok(FramePresenter {
            memory,
            surface,
            staging,
            stats: PresentStats::default(),
            failing: false,
        })
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn stats(&self) -> PresentStats {
        self.stats
    }

    fn upload(&mut self) -> Result<(), SurfaceError> {
        let stride = self.surface.bytes_per_row();
        let data = self.surface.pixel_data_mut()?;
        if data.len() < stride * SCREEN_HEIGHT {
            return Err(SurfaceError::Backend(format!(
                "surface exposed {} bytes, need {}",
                data.len(),
                stride * SCREEN_HEIGHT
            )));
        }

        if stride == ROW_STRIDE {
            self.memory
                .snapshot_into(&mut data[..GRAPHIC_MEMORY_SIZE])
                .map_err(|e| SurfaceError::Backend(e.to_string()))?;
        } else {
            self.memory
                .snapshot_into(&mut self.staging)
                .map_err(|e| SurfaceError::Backend(e.to_string()))?;
            for (row, src) in data.chunks_mut(stride).zip(self.staging.chunks(ROW_STRIDE)) {
                row[..ROW_STRIDE].copy_from_slice(src);
            }
        }

        self.surface.submit()
    }

    fn record_failure(&mut self, error: &SurfaceError) {
        self.stats.skipped += 1;
        if self.failing {
            debug!("Still skipping frames: {}", error);
        } else {
            warn!("Skipping frame: {}", error);
            self.failing = true;
        }
    }

    fn finish(&mut self, result: Result<(), SurfaceError>) -> PresentStatus {
        match result {
            Ok(()) => {
                if self.failing {
                    info!("Surface is back after {} skipped frames", self.stats.skipped);
                    self.failing = false;
                }
                self.stats.presented += 1;
                PresentStatus::Presented
            }
            Err(e) => {
                self.record_failure(&e);
                PresentStatus::Skipped
            }
        }
    }

    pub fn present_frame(&mut self) -> PresentStatus {
        let result = self.upload();
        self.finish(result)
    }
}

impl<S: Surface> Present for FramePresenter<S> {
    fn present_frame(&mut self) -> PresentStatus {
        FramePresenter::present_frame(self)
    }
}

/// Creates the hand-off between a readback presenter and the view that shows
/// its images. At most one image is ever pending. Images the view is done
/// with travel back to the sink to be drawn into again.
pub fn image_channel() -> (ImageSink, ImageView) {
    let (sender, receiver) = bounded(1);
    let (recycle, spares) = bounded(SPARE_IMAGES);
    let attached = Arc::new(AtomicBool::new(true));
    (
        ImageSink {
            sender,
            stale: receiver.clone(),
            spares,
            recycle: recycle.clone(),
            attached: attached.clone(),
        },
        ImageView { receiver, recycle, current: None, received: 0, attached },
    )
}

const SPARE_IMAGES: usize = 2;

pub struct ImageSink {
    sender: Sender<Bitmap>,
    // Lets the sink evict an image the view hasn't picked up yet
    stale: Receiver<Bitmap>,
    spares: Receiver<Bitmap>,
    recycle: Sender<Bitmap>,
    attached: Arc<AtomicBool>,
}

impl ImageSink {
    /// A bitmap to draw the next image into: one the view handed back, or a
    /// fresh one when none of the right size is free.
    pub fn spare(&self, width: usize, height: usize) -> Bitmap {
        match self.spares.try_recv() {
            Ok(bitmap) if bitmap.width() == width && bitmap.height() == height => bitmap,
            _ => Bitmap::new(width, height),
        }
    }

    pub fn post(&self, bitmap: Bitmap) -> Result<(), SurfaceError> {
        if !self.attached.load(Ordering::Acquire) {
            return Err(SurfaceError::Detached);
        }
        match self.sender.try_send(bitmap) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(bitmap)) => {
                if let Ok(stale) = self.stale.try_recv() {
                    let _ = self.recycle.try_send(stale);
                }
                if self.sender.try_send(bitmap).is_err() {
                    debug!("View is behind, dropping image");
                }
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(SurfaceError::Detached),
        }
    }
}

/*
 * The passive image view's end of the hand-off. Lives on the UI thread and
 * keeps showing the last image it received until a newer one arrives.
 */
pub struct ImageView {
    receiver: Receiver<Bitmap>,
    recycle: Sender<Bitmap>,
    current: Option<Bitmap>,
    received: u64,
    attached: Arc<AtomicBool>,
}

impl ImageView {
    /// Picks up the newest pending image, if any, and returns what to show.
    pub fn refresh(&mut self) -> Option<&Bitmap> {
        while let Ok(bitmap) = self.receiver.try_recv() {
            if let Some(shown) = self.current.replace(bitmap) {
                let _ = self.recycle.try_send(shown);
            }
            self.received += 1;
        }
        self.current.as_ref()
    }

    pub fn image(&self) -> Option<&Bitmap> {
        self.current.as_ref()
    }

    pub fn received(&self) -> u64 {
        self.received
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        self.attached.store(false, Ordering::Release);
    }
}

/*
 * Strategy 2: present into a texture, read it back into a bitmap and hand the
 * bitmap to an image view on the UI thread.
 */
pub struct ReadbackPresenter<S: Readback> {
    presenter: FramePresenter<S>,
    bitmap: Bitmap,
    sink: ImageSink,
}

impl<S: Readback> ReadbackPresenter<S> {
    pub fn new(memory: Arc<dyn DisplayMemory>, texture: S, sink: ImageSink) -> Result<Self, BridgeError> {
        Ok(ReadbackPresenter {
            presenter: FramePresenter::new(memory, texture)?,
            bitmap: Bitmap::new(SCREEN_WIDTH, SCREEN_HEIGHT),
            sink,
        })
    }

    pub fn texture(&self) -> &S {
        self.presenter.surface()
    }

    pub fn stats(&self) -> PresentStats {
        self.presenter.stats()
    }

    fn deliver(&mut self) -> Result<(), SurfaceError> {
        self.presenter.surface().read_back(&mut self.bitmap)?;
        let next = self.sink.spare(SCREEN_WIDTH, SCREEN_HEIGHT);
        self.sink.post(mem::replace(&mut self.bitmap, next))
    }

    pub fn present_frame(&mut self) -> PresentStatus {
        let result = self.presenter.upload().and_then(|()| self.deliver());
        self.presenter.finish(result)
    }
}

impl<S: Readback> Present for ReadbackPresenter<S> {
    fn present_frame(&mut self) -> PresentStatus {
        ReadbackPresenter::present_frame(self)
    }
}

impl<P: Present + ?Sized> Present for Box<P> {
    fn present_frame(&mut self) -> PresentStatus {
        (**self).present_frame()
    }
}
