use std::fmt;
use std::sync::atomic::{fence, AtomicU64, AtomicU8, AtomicUsize, Ordering};

use crate::display_memory::DisplayMemory;
use crate::error::BridgeError;

pub const SCREEN_WIDTH: usize = 320;
pub const SCREEN_HEIGHT: usize = 240;
pub const BYTES_PER_PIXEL: usize = 4;
pub const ROW_STRIDE: usize = SCREEN_WIDTH * BYTES_PER_PIXEL;
pub const GRAPHIC_MEMORY_SIZE: usize = ROW_STRIDE * SCREEN_HEIGHT;

// A double-buffered read that keeps colliding with publishes gives up and
// returns what it copied.
const MAX_READ_ATTEMPTS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferMode {
    /// One plane, writes are visible immediately. Readers may see a tear.
    Single,
    /// Back plane for the producer, front plane for readers, swapped by `publish()`.
    Double,
}

type Plane = Box<[AtomicU8]>;

fn new_plane() -> Plane {
    (0..GRAPHIC_MEMORY_SIZE).map(|_| AtomicU8::new(0)).collect()
}

/*
 * The display RAM of the emulated machine: 320x240 pixels, 4 bytes per pixel
 * (R, G, B, A), row-major, no padding.
 *
 * Bytes live in atomic cells so the emulation thread can write while the
 * presenter copies without either side taking a lock. Every access is a
 * bounds-checked byte copy; the worst a racing reader can get is a torn frame.
 */
pub struct SharedFrameBuffer {
    mode: BufferMode,
    planes: Vec<Plane>,
    front: AtomicUsize,
    generation: AtomicU64,
}

impl SharedFrameBuffer {
    pub fn new(mode: BufferMode) -> Self {
        let plane_count = match mode {
            BufferMode::Single => 1,
            BufferMode::Double => 2,
        };
        SharedFrameBuffer {
            mode,
            planes: (0..plane_count).map(|_| new_plane()).collect(),
            front: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        GRAPHIC_MEMORY_SIZE
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Number of visible changes so far. Bumped by every write in `Single`
    /// mode and by every `publish()` in `Double` mode.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    // Only the producer moves `front`, so it can read it relaxed.
    fn back_index(&self) -> usize {
        match self.mode {
            BufferMode::Single => 0,
            BufferMode::Double => 1 - self.front.load(Ordering::Relaxed),
        }
    }

    fn mark_written(&self) {
        if self.mode == BufferMode::Single {
            self.generation.fetch_add(1, Ordering::Release);
        }
    }

    pub fn write_region(&self, offset: usize, bytes: &[u8]) -> Result<(), BridgeError> {
        let end = offset
            .checked_add(bytes.len())
            .filter(|end| *end <= GRAPHIC_MEMORY_SIZE)
            .ok_or(BridgeError::OutOfBounds { offset, len: bytes.len() })?;

        let plane = &self.planes[self.back_index()];
        for (cell, byte) in plane[offset..end].iter().zip(bytes) {
            cell.store(*byte, Ordering::Relaxed);
        }
        self.mark_written();
        Ok(())
    }

    pub fn fill(&self, value: u8) {
        for cell in self.planes[self.back_index()].iter() {
            cell.store(value, Ordering::Relaxed);
        }
        self.mark_written();
    }

    /// Makes everything written since the last publish visible to readers.
    /// The published frame is then copied into the new back plane so the
    /// producer keeps drawing on top of it.
    pub fn publish(&self) {
        if self.mode == BufferMode::Single {
            return;
        }
        let published = self.back_index();
        self.front.store(published, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
        fence(Ordering::Release);

        let back = &self.planes[1 - published];
        for (dst, src) in back.iter().zip(self.planes[published].iter()) {
            dst.store(src.load(Ordering::Relaxed), Ordering::Relaxed);
        }
    }

    /// Copies the visible plane into `dst`, which must be exactly
    /// `GRAPHIC_MEMORY_SIZE` bytes. Returns the generation the copy was taken at.
    pub fn snapshot_into(&self, dst: &mut [u8]) -> Result<u64, BridgeError> {
        if dst.len() != GRAPHIC_MEMORY_SIZE {
            return Err(BridgeError::BufferSizeMismatch {
                expected: GRAPHIC_MEMORY_SIZE,
                actual: dst.len(),
            });
        }

        let mut attempts = 0;
        loop {
            let generation = self.generation.load(Ordering::Acquire);
            let plane = &self.planes[self.front.load(Ordering::Acquire)];
            for (byte, cell) in dst.iter_mut().zip(plane.iter()) {
                *byte = cell.load(Ordering::Relaxed);
            }
            attempts += 1;

            if self.mode == BufferMode::Single || attempts == MAX_READ_ATTEMPTS {
                return Ok(generation);
            }
            fence(Ordering::Acquire);
            if self.generation.load(Ordering::Relaxed) == generation {
                return Ok(generation);
            }
        }
    }

    pub fn graphic_memory(&self) -> Vec<u8> {
        let mut result = vec![0; GRAPHIC_MEMORY_SIZE];
        // The destination is sized to the buffer, the copy can't fail.
        let _ = self.snapshot_into(&mut result);
        result
    }
}

impl DisplayMemory for SharedFrameBuffer {
    fn len(&self) -> usize {
        SharedFrameBuffer::len(self)
    }

    fn snapshot_into(&self, dst: &mut [u8]) -> Result<u64, BridgeError> {
        SharedFrameBuffer::snapshot_into(self, dst)
    }
}

impl fmt::Debug for SharedFrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedFrameBuffer")
            .field("mode", &self.mode)
            .field("len", &GRAPHIC_MEMORY_SIZE)
            .field("generation", &self.generation())
            .finish()
    }
}
