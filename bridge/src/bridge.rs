use std::sync::Arc;

use log::info;

use crate::emulator::EmulationDriver;
use crate::error::BridgeError;
use crate::memory::SharedFrameBuffer;
use crate::refresh_clock::RefreshClock;

/*
 * Ties the emulation driver and the refresh clock to the view's lifecycle.
 *
 * Fields are declared in teardown order. Dropping the bridge stops the clock,
 * then the driver, and only then lets go of display memory.
 */
pub struct DisplayBridge {
    clock: RefreshClock,
    driver: EmulationDriver,
    display: Arc<SharedFrameBuffer>,
}

impl DisplayBridge {
    pub fn new(driver: EmulationDriver, clock: RefreshClock) -> DisplayBridge {
        let (display, _) = driver.display_memory();
        DisplayBridge { clock, driver, display }
    }

    /// Starts the emulation thread. The clock waits for the view.
    pub fn start(&self) -> Result<(), BridgeError> {
        self.driver.start_background_execution()
    }

    pub fn view_did_appear(&self) -> Result<(), BridgeError> {
        self.clock.start()
    }

    pub fn view_will_disappear(&self) {
        self.clock.stop();
    }

    pub fn clock(&self) -> &RefreshClock {
        &self.clock
    }

    pub fn driver(&self) -> &EmulationDriver {
        &self.driver
    }

    pub fn display_memory(&self) -> &Arc<SharedFrameBuffer> {
        &self.display
    }

    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for DisplayBridge {
    fn drop(&mut self) {
        self.clock.stop();
        self.driver.stop();
        info!("Display bridge shut down");
    }
}
