use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info};

use crate::error::BridgeError;
use crate::presenter::Present;

pub const DEFAULT_REFRESH_HZ: f64 = 60.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cadence {
    period: Duration,
}

impl Cadence {
    /// Nonsensical rates, including ones whose period doesn't fit a
    /// `Duration`, fall back to the 60 Hz timer.
    pub fn from_hz(hz: f64) -> Cadence {
        let period = if hz.is_finite() && hz > 0.0 {
            Duration::try_from_secs_f64(1.0 / hz).ok()
        } else {
            None
        };
        match period {
            Some(period) => Cadence::from_period(period),
            None => Cadence::from_period(Duration::from_secs_f64(1.0 / DEFAULT_REFRESH_HZ)),
        }
    }

    pub fn from_period(period: Duration) -> Cadence {
        Cadence { period: period.max(Duration::from_micros(100)) }
    }

    /// Follows the display's refresh rate when the view layer knows it.
    pub fn display(refresh_hz: Option<f64>) -> Cadence {
        Cadence::from_hz(refresh_hz.unwrap_or(DEFAULT_REFRESH_HZ))
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Cadence::from_hz(DEFAULT_REFRESH_HZ)
    }
}

type TickFn = dyn FnMut() + Send;

#[derive(Default)]
struct Counters {
    // Id of the run currently ticking, 0 when stopped
    active_run: AtomicU64,
    last_run: AtomicU64,
    ticks: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    // Only the run that is still current may mark the clock stopped
    fn finish_run(&self, run: u64) {
        let _ = self
            .active_run
            .compare_exchange(run, 0, Ordering::AcqRel, Ordering::Acquire);
    }
}

struct ClockThread {
    // Dropping the sender is the stop signal
    _stop: Sender<()>,
    handle: JoinHandle<()>,
    id: ThreadId,
    run: u64,
}

// Ends the run however the clock thread exits
struct RunningGuard<'a> {
    counters: &'a Counters,
    run: u64,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.counters.finish_run(self.run);
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/*
 * Calls `on_tick` once per period on its own thread. There is only ever one
 * tick in flight; ticks missed while a tick ran long are dropped, not queued.
 */
pub struct RefreshClock {
    cadence: Cadence,
    on_tick: Arc<Mutex<Box<TickFn>>>,
    thread: Mutex<Option<ClockThread>>,
    counters: Arc<Counters>,
}

impl RefreshClock {
    pub fn new<F>(cadence: Cadence, on_tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        RefreshClock {
            cadence,
            on_tick: Arc::new(Mutex::new(Box::new(on_tick))),
            thread: Mutex::new(None),
            counters: Arc::new(Counters::default()),
        }
    }

    /// A clock whose every tick is one `present_frame()`.
    pub fn driving<P>(cadence: Cadence, mut presenter: P) -> Self
    where
        P: Present + Send + 'static,
    {
        RefreshClock::new(cadence, move || {
            presenter.present_frame();
        })
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    pub fn is_running(&self) -> bool {
        self.counters.active_run.load(Ordering::Acquire) != 0
    }

    pub fn ticks(&self) -> u64 {
        self.counters.ticks.load(Ordering::Relaxed)
    }

    pub fn dropped_ticks(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    /// Starting a running clock does nothing.
    pub fn start(&self) -> Result<(), BridgeError> {
        let mut slot = lock(&self.thread);
        if slot.is_some() {
            return Ok(());
        }

        let (stop_sender, stop_receiver) = bounded::<()>(1);
        let cadence = self.cadence;
        let on_tick = self.on_tick.clone();
        let counters = self.counters.clone();
        let run_id = counters.last_run.fetch_add(1, Ordering::Relaxed) + 1;
        counters.active_run.store(run_id, Ordering::Release);

        let spawned = thread::Builder::new()
            .name("refresh-clock".into())
            .spawn(move || run(cadence, &on_tick, &stop_receiver, &counters, run_id));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.counters.finish_run(run_id);
                return Err(BridgeError::Spawn { name: "refresh-clock", reason: e.to_string() });
            }
        };

        info!("Refresh clock started, period {:?}", cadence.period());
        let id = handle.thread().id();
        *slot = Some(ClockThread { _stop: stop_sender, handle, id, run: run_id });
        Ok(())
    }

    /// Lets an in-flight tick finish; no tick starts once this returns.
    /// Safe from any thread, including from inside `on_tick`.
    pub fn stop(&self) {
        // Release the slot before joining so a tick calling stop() can't deadlock
        let clock_thread = lock(&self.thread).take();
        let ClockThread { _stop, handle, id, run } = match clock_thread {
            Some(clock_thread) => clock_thread,
            None => return,
        };
        drop(_stop);
        self.counters.finish_run(run);

        if id == thread::current().id() {
            debug!("Refresh clock stopped from its own tick");
            return;
        }
        if handle.join().is_err() {
            debug!("Refresh clock thread panicked");
        }
        info!(
            "Refresh clock stopped after {} ticks, {} dropped",
            self.ticks(),
            self.dropped_ticks()
        );
    }
}

impl Drop for RefreshClock {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    cadence: Cadence,
    on_tick: &Mutex<Box<TickFn>>,
    stop: &Receiver<()>,
    counters: &Counters,
    run_id: u64,
) {
    let _running = RunningGuard { counters, run: run_id };
    let period = cadence.period();
    let mut deadline = Instant::now() + period;

    loop {
        match stop.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        {
            let mut guard = lock(on_tick);
            let tick: &mut TickFn = &mut **guard;
            tick();
        }
        counters.ticks.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        deadline += period;
        if deadline <= now {
            let missed = ((now - deadline).as_nanos() / period.as_nanos()) as u64 + 1;
            counters.dropped.fetch_add(missed, Ordering::Relaxed);
            deadline = now + period;
        }
    }
}

/*
 * Frame-dropping hand-off for ticks that are serviced on another thread (the
 * UI loop, typically). A tick that finds the previous one still in flight is
 * dropped.
 */
#[derive(Debug, Default)]
pub struct TickGate {
    in_flight: AtomicBool,
    dropped: AtomicU64,
}

impl TickGate {
    pub fn try_acquire(&self) -> bool {
        let acquired = self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !acquired {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        acquired
    }

    pub fn release(&self) {
        self.in_flight.store(false, Ordering::Release);
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
