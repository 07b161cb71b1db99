use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::supervisor::{ForegroundSlot, Watchdog};
use crate::types::ShellError;
use crate::utils::retry_eintr;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JobKind {
    Foreground,
    Background,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub pids: Vec<Pid>,
    pub kind: JobKind,
    pub started: Instant,
}

/// How a job ended, from the shell's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Exited(i32),
    Signaled(Signal),
    TimedOut { pids: Vec<Pid>, after: Duration },
    Background { pids: Vec<Pid> },
}

impl JobOutcome {
    /// Conventional shell status: the exit code, or 128 + signal number.
    pub fn status(&self) -> i32 {
        match self {
            JobOutcome::Exited(code) => *code,
            JobOutcome::Signaled(signal) => 128 + *signal as i32,
            JobOutcome::TimedOut { .. } => 128 + Signal::SIGKILL as i32,
            JobOutcome::Background { .. } => 0,
        }
    }
}

/// A background job whose processes have all been collected.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedJob {
    pub pids: Vec<Pid>,
    /// `None` when the status was collected by someone else.
    pub status: Option<i32>,
    pub elapsed: Duration,
}

#[derive(Debug)]
struct BackgroundEntry {
    job: Job,
    pending: Vec<Pid>,
    last_status: Option<i32>,
}

pub struct JobController {
    slot: Arc<ForegroundSlot>,
    timeout: Option<Duration>,
    background: Vec<BackgroundEntry>,
}

impl JobController {
    pub fn new(slot: Arc<ForegroundSlot>, timeout: Option<Duration>) -> Self {
        JobController {
            slot,
            timeout,
            background: Vec::new(),
        }
    }

    /// Take ownership of freshly launched pids.
    ///
    /// Background jobs are recorded and returned immediately. Foreground jobs
    /// occupy the slot, run under the watchdog and are waited for; the slot is
    /// empty again by the time this returns.
    pub fn run(&mut self, pids: Vec<Pid>, background: bool) -> Result<JobOutcome, ShellError> {
        let kind = if background {
            JobKind::Background
        } else {
            JobKind::Foreground
        };
        let job = Job {
            pids,
            kind,
            started: Instant::now(),
        };

        log::info!("{:?} job started: {:?}", job.kind, job.pids);
        match job.kind {
            JobKind::Background => {
                let pids = job.pids.clone();
                self.background.push(BackgroundEntry {
                    pending: job.pids.clone(),
                    last_status: None,
                    job,
                });
                Ok(JobOutcome::Background { pids })
            }
            JobKind::Foreground => self.wait_foreground(job, Watchdog::arm),
        }
    }

    fn wait_foreground<A>(&mut self, job: Job, arm: A) -> Result<JobOutcome, ShellError>
    where
        A: FnOnce(Arc<ForegroundSlot>, Duration) -> Result<Watchdog, ShellError>,
    {
        self.slot.set(&job.pids);
        let watchdog = match self.timeout {
            Some(timeout) => match arm(self.slot.clone(), timeout) {
                Ok(watchdog) => Some(watchdog),
                Err(e) => {
                    self.abandon(&job.pids);
                    return Err(e);
                }
            },
            None => None,
        };

        let mut last = None;
        let mut wait_error = None;
        for &pid in &job.pids {
            match retry_eintr(|| waitpid(pid, None)) {
                Ok(status) => last = Some(status),
                Err(errno) => {
                    wait_error.get_or_insert(ShellError::nix(format!("waitpid {}", pid), errno));
                }
            }
            self.slot.remove(pid);
        }

        let fired = watchdog.map(Watchdog::disarm).unwrap_or(false);
        self.slot.clear();

        if let Some(e) = wait_error {
            return Err(e);
        }
        let outcome = match last {
            Some(WaitStatus::Signaled(_, Signal::SIGKILL, _)) if fired => JobOutcome::TimedOut {
                pids: job.pids.clone(),
                after: job.started.elapsed(),
            },
            Some(status) => outcome_from(status),
            None => JobOutcome::Exited(0),
        };
        log::info!(
            "foreground job {:?} finished after {:?}: {:?}",
            job.pids,
            job.started.elapsed(),
            outcome
        );
        Ok(outcome)
    }

    /// Kill and reap a foreground job that could not be supervised.
    fn abandon(&self, pids: &[Pid]) {
        log::error!("abandoning foreground job {:?}", pids);
        for &pid in pids {
            let _ = kill(pid, Signal::SIGKILL);
            let _ = retry_eintr(|| waitpid(pid, None));
            self.slot.remove(pid);
        }
        self.slot.clear();
    }

    /// Collect background processes that have exited, without blocking.
    pub fn reap_background(&mut self) -> Vec<FinishedJob> {
        for BackgroundEntry {
            job,
            pending,
            last_status,
        } in &mut self.background
        {
            // a pipeline reports the status of its last stage
            let last_pid = job.pids.last().copied();
            pending.retain(|&pid| match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => true,
                Ok(status) => {
                    if Some(pid) == last_pid {
                        *last_status = Some(outcome_from(status).status());
                    }
                    false
                }
                Err(errno) => {
                    // ECHILD: already collected elsewhere
                    log::debug!("waitpid {} failed: {}", pid, errno);
                    false
                }
            });
        }

        let (done, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.background)
            .into_iter()
            .partition(|entry| entry.pending.is_empty());
        self.background = running;

        done.into_iter()
            .map(|entry| {
                let finished = FinishedJob {
                    pids: entry.job.pids,
                    status: entry.last_status,
                    elapsed: entry.job.started.elapsed(),
                };
                log::info!(
                    "reaped background job {:?}: status {:?}",
                    finished.pids,
                    finished.status
                );
                finished
            })
            .collect()
    }

    pub fn background_jobs(&self) -> Vec<&Job> {
        self.background.iter().map(|entry| &entry.job).collect()
    }

    #[cfg(test)]
    pub fn foreground(&self) -> Vec<Pid> {
        self.slot.pids()
    }
}

fn outcome_from(status: WaitStatus) -> JobOutcome {
    match status {
        WaitStatus::Exited(_, code) => JobOutcome::Exited(code),
        WaitStatus::Signaled(_, signal, _) => JobOutcome::Signaled(signal),
        other => {
            log::debug!("unexpected wait status {:?}", other);
            JobOutcome::Exited(1)
        }
    }
}
