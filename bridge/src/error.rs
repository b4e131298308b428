use thiserror::Error;

/*
 * Errors raised while setting up the bridge or by the producer side.
 * These propagate to the caller: a bridge that fails here never starts.
 */
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("display memory is {actual} bytes, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("surface is {width}x{height}, expected {expected_width}x{expected_height}")]
    SurfaceSizeMismatch {
        width: usize,
        height: usize,
        expected_width: usize,
        expected_height: usize,
    },

    #[error("surface rows are {actual} bytes, need at least {minimum}")]
    StrideTooSmall { minimum: usize, actual: usize },

    #[error("write of {len} bytes at offset {offset} is outside display memory")]
    OutOfBounds { offset: usize, len: usize },

    #[error("emulation driver was already started")]
    AlreadyStarted,

    #[error("couldn't spawn the {name} thread: {reason}")]
    Spawn { name: &'static str, reason: String },
}

/*
 * Per-frame failures of a surface. The presenter swallows these: the frame
 * is skipped and the previous image stays on screen.
 */
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("graphics device lost")]
    DeviceLost,

    #[error("view has been torn down")]
    Detached,

    #[error("surface backend error: {0}")]
    Backend(String),
}
