use std::fs::OpenOptions;

use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode, WriteLogger};

use crate::config::Config;
use crate::types::ShellError;

/// Install the global logger.
///
/// With `log_file` set, records are appended to that file so they never
/// interleave with the prompt. Otherwise they go to stderr, which at the
/// default `warn` level only carries timeout kills and launch problems.
pub fn init(config: &Config) -> Result<(), ShellError> {
    let level = config.level_filter()?;
    let log_config = ConfigBuilder::new()
        .set_target_level(simplelog::LevelFilter::Off)
        .set_thread_level(simplelog::LevelFilter::Off)
        .build();

    let result = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            WriteLogger::init(level, log_config, file)
        }
        None => TermLogger::init(level, log_config, TerminalMode::Stderr, ColorChoice::Auto),
    };
    result.map_err(|e| ShellError::Config(format!("logger already initialised: {}", e)))
}
