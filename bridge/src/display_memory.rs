use crate::error::BridgeError;

/*
 * The consumption side of display RAM: what the presenter needs from whatever
 * the emulation core draws into.
 */
pub trait DisplayMemory: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the whole visible region into `dst`, which must be `len()` bytes.
    fn snapshot_into(&self, dst: &mut [u8]) -> Result<u64, BridgeError>;
}
