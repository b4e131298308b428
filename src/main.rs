use std::process;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use log::{error, info};

use bridge::{BufferMode, Cadence, EmulationDriver, SharedFrameBuffer};

mod graphics;
mod program;
mod window;

use crate::program::DemoProgram;
use crate::window::{run_direct, run_readback, scale_for, WindowConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Strategy {
    /// Upload display memory straight into the window
    Direct,
    /// Render off-screen, read back, hand the image to the window
    Readback,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Buffering {
    Single,
    Double,
}

impl From<Buffering> for BufferMode {
    fn from(buffering: Buffering) -> Self {
        match buffering {
            Buffering::Single => BufferMode::Single,
            Buffering::Double => BufferMode::Double,
        }
    }
}

/// Shows the 320x240 screen of an emulated calculator.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[arg(long, value_enum, default_value_t = Strategy::Direct)]
    strategy: Strategy,

    /// Single tears under load, double only shows whole frames
    #[arg(long, value_enum, default_value_t = Buffering::Double)]
    buffer: Buffering,

    /// Window scale: 1, 2, 4 or 8
    #[arg(long, default_value_t = 2)]
    scale: u32,

    /// Refresh rate of the display, 60 Hz when not given
    #[arg(long)]
    refresh_hz: Option<f64>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let scale = match scale_for(args.scale) {
        Some(scale) => scale,
        None => {
            error!("Unsupported scale {}, use 1, 2, 4 or 8", args.scale);
            process::exit(2);
        }
    };
    let config = WindowConfig { scale, cadence: Cadence::display(args.refresh_hz) };

    let display = Arc::new(SharedFrameBuffer::new(args.buffer.into()));
    let driver = EmulationDriver::new(DemoProgram::new(), display);
    info!(
        "Starting with {:?} strategy, {:?} buffering, {:?} refresh period",
        args.strategy,
        args.buffer,
        config.cadence.period()
    );

    let result = match args.strategy {
        Strategy::Direct => run_direct(driver, config),
        Strategy::Readback => run_readback(driver, config),
    };
    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}
