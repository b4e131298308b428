use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/*
 * Flags and counters shared between the emulation thread and the rest of the
 * application. Everything is atomic so neither side ever waits on the other.
 */
#[derive(Debug, Default)]
pub struct SharedState {
    running: AtomicBool,
    cancelled: AtomicBool,
    paused: AtomicBool,
    steps: AtomicU64,
    cycles: AtomicU64,
    // f64 bits
    megahertz: AtomicU64,
}

impl SharedState {
    pub fn new() -> SharedState {
        SharedState::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool { self.paused.load(Ordering::Acquire) }
    pub fn pause(&self) { self.paused.store(true, Ordering::Release); }
    pub fn unpause(&self) { self.paused.store(false, Ordering::Release); }

    pub(crate) fn record_step(&self, cycles: u64) {
        self.steps.fetch_add(1, Ordering::Relaxed);
        self.cycles.fetch_add(cycles, Ordering::Relaxed);
    }

    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::Relaxed)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn set_megahertz(&self, mhz: f64) {
        self.megahertz.store(mhz.to_bits(), Ordering::Relaxed);
    }

    pub fn get_megahertz(&self) -> f64 {
        f64::from_bits(self.megahertz.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod test {
    use super::SharedState;

    #[test]
    fn pause_and_unpause() {
        let state = SharedState::new();
        assert!(!state.is_paused());
        state.pause();
        assert!(state.is_paused());
        state.unpause();
        assert!(!state.is_paused());
    }

    #[test]
    fn megahertz_round_trips_through_the_atomic() {
        let state = SharedState::new();
        assert_eq!(state.get_megahertz(), 0.0);
        state.set_megahertz(2.5);
        assert_eq!(state.get_megahertz(), 2.5);
    }
}
