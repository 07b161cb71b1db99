use std::io::Write;
use std::sync::Arc;

use crate::ast::CommandLine;
use crate::builtins::{self, BuiltinStatus};
use crate::config::{Config, Limits};
use crate::job::{FinishedJob, JobController, JobOutcome};
use crate::launcher;
use crate::parser;
use crate::supervisor::{ForegroundSlot, Supervisor};
use crate::tokenizer;
use crate::types::ShellError;

#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Empty,
    Builtin(i32),
    Exit,
    Job(JobOutcome),
}

/// Interpreter state for one interactive session.
pub struct Shell {
    limits: Limits,
    jobs: JobController,
    supervisor: Supervisor,
}

impl Shell {
    pub fn new(config: &Config) -> Self {
        let slot = Arc::new(ForegroundSlot::default());
        Shell {
            limits: config.limits(),
            jobs: JobController::new(slot.clone(), config.timeout()),
            supervisor: Supervisor::new(slot),
        }
    }

    /// Tokenize, classify and run one line.
    ///
    /// Built-ins are only recognised on plain lines; on piped or redirected
    /// lines every program name goes to the launcher.
    pub fn execute_line(
        &mut self,
        line: &str,
        out: &mut dyn Write,
    ) -> Result<LineOutcome, ShellError> {
        let tokens = tokenizer::tokenize(line, &self.limits)?;
        if tokens.is_empty() {
            return Ok(LineOutcome::Empty);
        }

        let command = parser::parse(&tokens.args)?;
        if let CommandLine::Plain(stage) = &command {
            if builtins::is_builtin(stage.program()) {
                if tokens.background {
                    log::debug!("ignoring `&` on builtin {}", stage.program());
                }
                return match builtins::execute_builtin(&stage.argv, out)? {
                    BuiltinStatus::Continue(status) => Ok(LineOutcome::Builtin(status)),
                    BuiltinStatus::Exit => Ok(LineOutcome::Exit),
                };
            }
        }

        // flush anything a builtin left buffered before children share the fd
        out.flush()?;
        let pids = launcher::launch(&command)?;
        let outcome = self.jobs.run(pids, tokens.background)?;
        Ok(LineOutcome::Job(outcome))
    }

    pub fn reap_background(&mut self) -> Vec<FinishedJob> {
        self.jobs.reap_background()
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn jobs(&self) -> &JobController {
        &self.jobs
    }
}
