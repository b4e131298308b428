use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{error, info, warn};
use once_cell::sync::OnceCell;

use crate::emulator_state::SharedState;
use crate::error::BridgeError;
use crate::memory::SharedFrameBuffer;

const PAUSE_POLL: Duration = Duration::from_millis(16);
const MEGAHERTZ_WINDOW: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepStatus {
    Continue,
    Paused,
    Success(String),
    Failure(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepResult {
    pub status: StepStatus,
    pub cycles: u64,
}

impl StepResult {
    pub fn running(cycles: u64) -> StepResult {
        StepResult { status: StepStatus::Continue, cycles }
    }
}

/*
 * The emulated machine, seen from the driver: something that can be run one
 * slice at a time and draws into display RAM as it goes. How long a slice is,
 * and whether the core paces itself, is up to the core.
 */
pub trait EmulationCore: Send + 'static {
    fn step(&mut self, display: &SharedFrameBuffer) -> StepResult;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct RunningGuard<'a>(&'a SharedState);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set_running(false);
    }
}

/*
 * Runs the emulation core on one background thread, free-running and never
 * paced to the display. Cancellation is cooperative: the flag is checked
 * between steps.
 */
pub struct EmulationDriver {
    display: Arc<SharedFrameBuffer>,
    state: Arc<SharedState>,
    core: Mutex<Option<Box<dyn EmulationCore>>>,
    started: OnceCell<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl EmulationDriver {
    pub fn new<C: EmulationCore>(core: C, display: Arc<SharedFrameBuffer>) -> EmulationDriver {
        EmulationDriver {
            display,
            state: Arc::new(SharedState::new()),
            core: Mutex::new(Some(Box::new(core))),
            started: OnceCell::new(),
            handle: Mutex::new(None),
        }
    }

    /// Spawns the emulation thread. A driver only ever runs once.
    pub fn start(&self) -> Result<(), BridgeError> {
        self.started.set(()).map_err(|_| BridgeError::AlreadyStarted)?;
        let core = lock(&self.core).take().ok_or(BridgeError::AlreadyStarted)?;

        let display = self.display.clone();
        let state = self.state.clone();
        self.state.set_running(true);
        let spawned = thread::Builder::new()
            .name("emulator".into())
            .spawn(move || run_core(core, &display, &state));

        match spawned {
            Ok(handle) => {
                info!("Emulation thread started");
                *lock(&self.handle) = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.state.set_running(false);
                Err(BridgeError::Spawn { name: "emulator", reason: e.to_string() })
            }
        }
    }

    pub fn start_background_execution(&self) -> Result<(), BridgeError> {
        self.start()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Asks the core to stop after its current step and waits for the thread.
    pub fn stop(&self) {
        self.state.cancel();
        let handle = lock(&self.handle).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("Emulation thread panicked");
            } else {
                info!("Emulation thread stopped after {} steps", self.state.steps());
            }
        }
    }

    pub fn display_memory(&self) -> (Arc<SharedFrameBuffer>, usize) {
        (self.display.clone(), self.display.len())
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn is_paused(&self) -> bool { self.state.is_paused() }
    pub fn pause(&self) { self.state.pause(); }
    pub fn unpause(&self) { self.state.unpause(); }

    pub fn steps(&self) -> u64 {
        self.state.steps()
    }

    pub fn cycles(&self) -> u64 {
        self.state.cycles()
    }

    pub fn megahertz(&self) -> f64 {
        self.state.get_megahertz()
    }
}

impl Drop for EmulationDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_core(mut core: Box<dyn EmulationCore>, display: &SharedFrameBuffer, state: &SharedState) {
    let _running = RunningGuard(state);
    let mut window_start = Instant::now();
    let mut window_cycles: u64 = 0;

    while !state.is_cancelled() {
        if state.is_paused() {
            thread::sleep(PAUSE_POLL);
            continue;
        }

        let result = core.step(display);
        state.record_step(result.cycles);

        window_cycles += result.cycles;
        let elapsed = window_start.elapsed();
        if elapsed >= MEGAHERTZ_WINDOW {
            state.set_megahertz(window_cycles as f64 / elapsed.as_micros() as f64);
            window_start = Instant::now();
            window_cycles = 0;
        }

        match result.status {
            StepStatus::Continue => {}
            StepStatus::Paused => thread::sleep(PAUSE_POLL),
            StepStatus::Success(message) => {
                info!("Emulation finished: {}", message);
                break;
            }
            StepStatus::Failure(message) => {
                error!("Emulation failed: {}", message);
                break;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::memory::BufferMode;

    fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    struct CountingCore {
        frame: u8,
    }

    impl EmulationCore for CountingCore {
        fn step(&mut self, display: &SharedFrameBuffer) -> StepResult {
            self.frame = self.frame.wrapping_add(1);
            display.fill(self.frame);
            thread::sleep(Duration::from_millis(1));
            StepResult::running(100)
        }
    }

    struct FiniteCore {
        remaining: u32,
    }

    impl EmulationCore for FiniteCore {
        fn step(&mut self, _display: &SharedFrameBuffer) -> StepResult {
            self.remaining -= 1;
            if self.remaining == 0 {
                StepResult { status: StepStatus::Success("done".into()), cycles: 1 }
            } else {
                StepResult::running(1)
            }
        }
    }

    struct PanickingCore;

    impl EmulationCore for PanickingCore {
        fn step(&mut self, _display: &SharedFrameBuffer) -> StepResult {
            panic!("core blew up");
        }
    }

    fn display() -> Arc<SharedFrameBuffer> {
        Arc::new(SharedFrameBuffer::new(BufferMode::Single))
    }

    #[test]
    fn runs_until_stopped() {
        let buffer = display();
        let driver = EmulationDriver::new(CountingCore { frame: 0 }, buffer.clone());
        assert!(!driver.is_running());
        driver.start().unwrap();
        assert!(driver.is_running());
        assert!(wait_until(Duration::from_secs(2), || driver.steps() >= 3));
        assert!(buffer.generation() >= 3);

        driver.stop();
        assert!(!driver.is_running());
        let steps = driver.steps();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(driver.steps(), steps);
        assert_eq!(driver.cycles(), steps * 100);
    }

    #[test]
    fn starts_only_once() {
        let driver = EmulationDriver::new(CountingCore { frame: 0 }, display());
        driver.start().unwrap();
        assert_eq!(driver.start(), Err(BridgeError::AlreadyStarted));
        driver.stop();
        assert_eq!(driver.start_background_execution(), Err(BridgeError::AlreadyStarted));
    }

    #[test]
    fn finishing_core_is_no_longer_running() {
        let driver = EmulationDriver::new(FiniteCore { remaining: 3 }, display());
        driver.start().unwrap();
        assert!(wait_until(Duration::from_secs(2), || !driver.is_running()));
        assert_eq!(driver.steps(), 3);
    }

    #[test]
    fn panicking_core_is_no_longer_running() {
        let driver = EmulationDriver::new(PanickingCore, display());
        driver.start().unwrap();
        assert!(wait_until(Duration::from_secs(2), || !driver.is_running()));
        driver.stop();
    }

    #[test]
    fn paused_core_does_not_step() {
        let driver = EmulationDriver::new(CountingCore { frame: 0 }, display());
        driver.pause();
        driver.start().unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(driver.steps(), 0);
        assert!(driver.is_running());

        driver.unpause();
        assert!(wait_until(Duration::from_secs(2), || driver.steps() > 0));
        driver.stop();
    }

    #[test]
    fn display_memory_is_the_shared_buffer() {
        let buffer = display();
        let driver = EmulationDriver::new(FiniteCore { remaining: 1 }, buffer.clone());
        let (memory, len) = driver.display_memory();
        assert!(Arc::ptr_eq(&memory, &buffer));
        assert_eq!(len, 307_200);
    }
}
