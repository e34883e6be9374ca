//! CLI argument definitions.

use clap::Parser;

/// Sends a single command to a tickbridge host and prints the response.
#[derive(Parser, Debug)]
#[command(name = "tickbridge", version)]
pub(crate) struct Cli {
    /// Parameters as a JSON object, for example `{"name":"Cube"}`.
    #[arg(long, value_name = "JSON")]
    pub(crate) params: Option<String>,
    /// A single parameter; the value is parsed as JSON when possible and
    /// sent as a string otherwise. May be repeated.
    #[arg(long = "param", short = 'p', value_name = "KEY=VALUE")]
    pub(crate) param: Vec<String>,
    /// Seconds to wait for connecting and for the response.
    #[arg(long, value_name = "SECONDS", default_value_t = 5.0)]
    pub(crate) timeout: f64,
    /// Pretty-prints the response.
    #[arg(long)]
    pub(crate) pretty: bool,
    /// Command type, either `subsystem.action` or a bare `core` action.
    #[arg(value_name = "COMMAND")]
    pub(crate) command: String,
}
