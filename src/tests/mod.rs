mod job_tests;

use crate::config::Config;
use crate::shell::{LineOutcome, Shell};
use crate::types::ShellError;

pub(crate) fn shell_with_timeout(timeout_ms: u64) -> Shell {
    let config = Config {
        timeout_ms,
        ..Config::default()
    };
    Shell::new(&config)
}

pub(crate) fn run_line(shell: &mut Shell, line: &str) -> Result<LineOutcome, ShellError> {
    let mut out = Vec::new();
    shell.execute_line(line, &mut out)
}
