//! Command-line client for a running tickbridge host.
//!
//! `tickbridge [CONFIG FLAGS] COMMAND [--params JSON] [--param KEY=VALUE]...`
//! sends one request envelope and prints the response envelope to stdout.
//! Configuration flags such as `--host` and `--port` must come before the
//! command; they are resolved together with `TICKBRIDGE_*` variables and the
//! configuration file.
//!
//! Exit status is `0` for a success envelope, `1` for an error envelope and
//! `2` when no response was obtained at all.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use clap::error::ErrorKind;

use tickbridge::{BridgeClient, ResponseEnvelope};

mod cli;
mod config;
mod errors;
mod params;

use cli::Cli;
use config::{ConfigLoader, OrthoConfigLoader, split_config_arguments};
pub(crate) use errors::AppError;
use params::build_parameters;

/// Exit status when the request never produced a response.
const EXIT_NO_RESPONSE: u8 = 2;

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

fn run_with_loader<I, W, E, L>(args: I, stdout: &mut W, stderr: &mut E, loader: &L) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);
    let cli = match Cli::try_parse_from(&split.command_arguments) {
        Ok(cli) => cli,
        Err(error) => return report_usage(&error, stdout, stderr),
    };

    let outcome = loader
        .load(&split.config_arguments)
        .and_then(|config| send(&cli, BridgeClient::new(config.endpoint())))
        .and_then(|response| {
            render(&response, cli.pretty, stdout)?;
            Ok(response)
        });

    match outcome {
        Ok(response) if response.is_error() => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            writeln!(stderr, "{error}").ok();
            if let AppError::Exchange(client_error) = &error
                && client_error.is_bridge_unavailable()
            {
                writeln!(stderr, "is the host application running?").ok();
            }
            ExitCode::from(EXIT_NO_RESPONSE)
        }
    }
}

fn send(cli: &Cli, client: BridgeClient) -> Result<ResponseEnvelope, AppError> {
    let parameters = build_parameters(cli.params.as_deref(), &cli.param)?;
    let timeout = timeout_from_secs(cli.timeout)?;
    client
        .with_timeout(timeout)
        .send(&cli.command, parameters)
        .map_err(AppError::from)
}

fn timeout_from_secs(seconds: f64) -> Result<Duration, AppError> {
    if seconds.is_nan() || seconds <= 0.0 {
        return Err(AppError::InvalidTimeout(seconds));
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| AppError::InvalidTimeout(seconds))
}

fn render<W: Write>(
    response: &ResponseEnvelope,
    pretty: bool,
    stdout: &mut W,
) -> Result<(), AppError> {
    if pretty {
        let text = serde_json::to_string_pretty(response).map_err(AppError::SerialiseResponse)?;
        writeln!(stdout, "{text}").map_err(AppError::WriteResponse)?;
    } else {
        stdout
            .write_all(&response.encode())
            .map_err(AppError::WriteResponse)?;
    }
    stdout.flush().map_err(AppError::WriteResponse)
}

fn report_usage<W: Write, E: Write>(error: &clap::Error, stdout: &mut W, stderr: &mut E) -> ExitCode {
    let rendered = error.render();
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            write!(stdout, "{rendered}").ok();
            ExitCode::SUCCESS
        }
        _ => {
            write!(stderr, "{rendered}").ok();
            ExitCode::from(EXIT_NO_RESPONSE)
        }
    }
}

#[cfg(test)]
mod tests;
