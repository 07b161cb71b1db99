use std::io::{self, Write};

use nix::sys::signal::Signal;
use nix::unistd::Pid;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::config::Config;
use crate::job::{FinishedJob, JobOutcome};
use crate::shell::{LineOutcome, Shell};
use crate::types::ShellError;

fn readline_error(e: ReadlineError) -> ShellError {
    ShellError::Io(io::Error::new(io::ErrorKind::Other, e.to_string()))
}

fn prompt(config: &Config) -> String {
    match std::env::current_dir() {
        Ok(cwd) => format!("{}{}", cwd.display(), config.prompt_suffix),
        Err(_) => format!("jobsh{}", config.prompt_suffix),
    }
}

fn join_pids(pids: &[Pid]) -> String {
    pids.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ")
}

fn report_outcome(outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Background { pids } => println!("Background process PID: {}", join_pids(pids)),
        JobOutcome::TimedOut { pids, .. } => {
            println!("\nTimeout reached. Killed foreground process (PID: {}).", join_pids(pids))
        }
        JobOutcome::Signaled(Signal::SIGINT) => {}
        JobOutcome::Signaled(signal) => eprintln!("jobsh: terminated by {}", signal),
        JobOutcome::Exited(code) => log::debug!("exit status {}", code),
    }
}

fn report_finished(finished: &[FinishedJob]) {
    for job in finished {
        match job.status {
            Some(status) => println!(
                "Background process PID: {} done (status {})",
                join_pids(&job.pids),
                status
            ),
            None => println!("Background process PID: {} done", join_pids(&job.pids)),
        }
    }
}

/// The interactive read loop. Returns when `exit` is entered or input ends.
pub fn run(config: &Config) -> Result<(), ShellError> {
    let mut shell = Shell::new(config);
    shell.supervisor().install()?;

    let mut rl = DefaultEditor::new().map_err(readline_error)?;
    if let Some(path) = &config.history_file {
        if let Err(e) = rl.load_history(path) {
            log::debug!("no history loaded from {}: {}", path.display(), e);
        }
    }

    loop {
        if shell.supervisor().take_interrupt() {
            println!("\nCaught SIGINT, continuing shell...");
        }
        report_finished(&shell.reap_background());

        match rl.readline(&prompt(config)) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = rl.add_history_entry(line.as_str());
                }
                let result = {
                    let stdout = io::stdout();
                    let mut out = stdout.lock();
                    let result = shell.execute_line(&line, &mut out);
                    let _ = out.flush();
                    result
                };
                match result {
                    Ok(LineOutcome::Exit) => break,
                    Ok(LineOutcome::Job(outcome)) => report_outcome(&outcome),
                    Ok(LineOutcome::Builtin(_)) | Ok(LineOutcome::Empty) => {}
                    Err(e) => eprintln!("jobsh: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("Caught SIGINT. Use 'exit' to quit the shell.");
            }
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => {
                eprintln!("jobsh: error reading input: {}", e);
                break;
            }
        }
    }

    let running = shell.jobs().background_jobs().len();
    if running > 0 {
        log::info!("leaving {} background job(s) running", running);
    }

    if let Some(path) = &config.history_file {
        if let Err(e) = rl.save_history(path) {
            log::warn!("failed to save history to {}: {}", path.display(), e);
        }
    }
    Ok(())
}
