//! CLI entrypoint for sending one command to a running bridge.
//!
//! The binary delegates to [`tickbridge_cli::run`], which loads configuration,
//! builds the request envelope and prints the bridge's response.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    tickbridge_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
