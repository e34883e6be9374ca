//! Configuration loading for the CLI.
//!
//! Leading configuration flags (`--host`, `--port`, ...) are handed to
//! `ortho_config`; everything from the first other token on is parsed as the
//! command line proper.

use std::ffi::OsString;

use tickbridge_config::{Config, OrthoConfig};

use crate::AppError;

/// Flags accepted by [`Config`]. Each takes a value.
const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--host",
    "--port",
    "--max-request-bytes",
    "--log-filter",
    "--log-format",
    "--tick-interval-ms",
    "--read-timeout-ms",
    "--write-timeout-ms",
];

pub(crate) trait ConfigLoader {
    /// Loads configuration from the leading configuration arguments.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) command_arguments: Vec<OsString>,
}

/// Splits `args` (including the program name) into configuration flags and
/// command arguments. Both halves keep the program name first.
pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let Some((program, rest)) = args.split_first() else {
        return ConfigArgumentSplit::default();
    };
    let mut split = ConfigArgumentSplit {
        config_arguments: vec![program.clone()],
        command_arguments: vec![program.clone()],
    };

    let mut index = 0;
    while let Some(argument) = rest.get(index) {
        let text = argument.to_string_lossy();
        let (flag, inline_value) = text
            .split_once('=')
            .map_or((text.as_ref(), false), |(name, _)| (name, true));
        if !CONFIG_CLI_FLAGS.contains(&flag) {
            break;
        }
        split.config_arguments.push(argument.clone());
        index += 1;
        if !inline_value && let Some(value) = rest.get(index) {
            split.config_arguments.push(value.clone());
            index += 1;
        }
    }
    split
        .command_arguments
        .extend(rest.iter().skip(index).cloned());
    split
}
