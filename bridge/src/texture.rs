use crate::error::SurfaceError;
use crate::memory::BYTES_PER_PIXEL;

/*
 * A texture the presenter can upload display RAM into. Pixels are RGBA8,
 * rows may be padded (`bytes_per_row` >= width * 4).
 */
pub trait Surface {
    fn size(&self) -> (usize, usize);

    fn bytes_per_row(&self) -> usize;

    /// The writable pixel data for the full extent, `bytes_per_row * height` bytes.
    fn pixel_data_mut(&mut self) -> Result<&mut [u8], SurfaceError>;

    /// Hands the texture to the display.
    fn submit(&mut self) -> Result<(), SurfaceError>;
}

/// A surface whose rendered contents can be copied back to the CPU.
pub trait Readback: Surface {
    fn read_back(&self, dst: &mut Bitmap) -> Result<(), SurfaceError>;
}

/// A CPU-side, tightly packed RGBA image, the kind a passive image view shows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl Bitmap {
    pub fn new(width: usize, height: usize) -> Self {
        Bitmap {
            width,
            height,
            pixels: vec![0; width * height * BYTES_PER_PIXEL],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y * self.width + x) * BYTES_PER_PIXEL;
        let mut result = [0; 4];
        result.copy_from_slice(&self.pixels[offset..offset + BYTES_PER_PIXEL]);
        Some(result)
    }
}

/*
 * A texture kept in ordinary memory. It is the render target of the readback
 * strategy and the stand-in for a device texture wherever no window exists.
 */
#[derive(Debug)]
pub struct MutableTexture {
    width: usize,
    height: usize,
    bytes_per_row: usize,
    data: Vec<u8>,
    submissions: u64,
}

impl MutableTexture {
    pub fn new(width: usize, height: usize) -> Self {
        MutableTexture::with_row_padding(width, height, width * BYTES_PER_PIXEL)
    }

    /// Device textures often align rows; `bytes_per_row` below the packed
    /// width is raised to it.
    pub fn with_row_padding(width: usize, height: usize, bytes_per_row: usize) -> Self {
        let bytes_per_row = bytes_per_row.max(width * BYTES_PER_PIXEL);
        MutableTexture {
            width,
            height,
            bytes_per_row,
            data: vec![0; bytes_per_row * height],
            submissions: 0,
        }
    }

    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y * self.bytes_per_row + x * BYTES_PER_PIXEL;
        let mut result = [0; 4];
        result.copy_from_slice(&self.data[offset..offset + BYTES_PER_PIXEL]);
        Some(result)
    }
}

impl Surface for MutableTexture {
    fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    fn pixel_data_mut(&mut self) -> Result<&mut [u8], SurfaceError> {
        Ok(&mut self.data)
    }

    fn submit(&mut self) -> Result<(), SurfaceError> {
        self.submissions += 1;
        Ok(())
    }
}

impl Readback for MutableTexture {
    fn read_back(&self, dst: &mut Bitmap) -> Result<(), SurfaceError> {
        if dst.width != self.width || dst.height != self.height {
            return Err(SurfaceError::Backend(format!(
                "readback target is {}x{}, texture is {}x{}",
                dst.width, dst.height, self.width, self.height
            )));
        }
        let packed = self.width * BYTES_PER_PIXEL;
        for (row, out) in self.data.chunks(self.bytes_per_row).zip(dst.pixels.chunks_mut(packed)) {
            out.copy_from_slice(&row[..packed]);
        }
        Ok(())
    }
}
