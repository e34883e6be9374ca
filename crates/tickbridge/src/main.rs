//! Reference host: runs the bridge with the built-in `core` subsystem on a
//! fixed-rate tick loop until SIGINT or SIGTERM.

use std::fmt::Display;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use signal_hook::consts::signal::{SIGINT, SIGTERM};

use tickbridge::{
    CoreSubsystem, HostError, StructuredBridgeReporter, SystemConfigLoader, bootstrap_with,
    run_until,
};

fn main() -> ExitCode {
    let reporter = Arc::new(StructuredBridgeReporter::new());
    let mut bridge = match bootstrap_with(&SystemConfigLoader, reporter) {
        Ok(bridge) => bridge,
        Err(error) => return fatal(&error),
    };

    let outcome = install_signals().and_then(|shutdown| {
        bridge.register_subsystem(Box::new(CoreSubsystem::new()))?;
        let interval = bridge.config().tick_interval();
        run_until(&mut bridge, interval, &shutdown)
    });
    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => fatal(&error),
    }
}

fn install_signals() -> Result<Arc<AtomicBool>, HostError> {
    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .map_err(|source| HostError::Signals { source })?;
    }
    Ok(shutdown)
}

#[expect(
    clippy::print_stderr,
    reason = "fatal errors may arrive before telemetry is installed"
)]
fn fatal(error: &dyn Display) -> ExitCode {
    eprintln!("tickbridge-host: {error}");
    ExitCode::FAILURE
}
