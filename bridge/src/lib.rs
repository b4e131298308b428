pub mod bridge;
pub mod display_memory;
pub mod emulator;
pub mod emulator_state;
pub mod error;
pub mod memory;
pub mod presenter;
pub mod refresh_clock;
pub mod texture;
mod test;

pub use crate::bridge::DisplayBridge;
pub use crate::display_memory::DisplayMemory;
pub use crate::emulator::{EmulationCore, EmulationDriver, StepResult, StepStatus};
pub use crate::error::{BridgeError, SurfaceError};
pub use crate::memory::{BufferMode, SharedFrameBuffer};
pub use crate::presenter::{
    image_channel, FramePresenter, ImageSink, ImageView, Present, PresentStats, PresentStatus,
    ReadbackPresenter,
};
pub use crate::refresh_clock::{Cadence, RefreshClock, TickGate};
pub use crate::texture::{Bitmap, MutableTexture, Readback, Surface};
