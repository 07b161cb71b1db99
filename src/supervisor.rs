use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::types::ShellError;

/// A pipeline has at most two stages.
pub const MAX_STAGES: usize = 2;

const EMPTY: i32 = 0;

/// The pids of the current foreground job, readable from other threads
/// without locking. One atomic cell per pipeline stage; 0 means empty.
#[derive(Debug, Default)]
pub struct ForegroundSlot {
    pids: [AtomicI32; MAX_STAGES],
}

impl ForegroundSlot {
    pub fn set(&self, pids: &[Pid]) {
        debug_assert!(pids.len() <= MAX_STAGES);
        for (i, cell) in self.pids.iter().enumerate() {
            let raw = pids.get(i).map(|p| p.as_raw()).unwrap_or(EMPTY);
            cell.store(raw, Ordering::SeqCst);
        }
    }

    pub fn clear(&self) {
        for cell in &self.pids {
            cell.store(EMPTY, Ordering::SeqCst);
        }
    }

    /// Vacate the cell holding `pid`. Called as soon as the pid is reaped so
    /// a recycled pid is never signalled.
    pub fn remove(&self, pid: Pid) {
        for cell in &self.pids {
            let _ = cell.compare_exchange(pid.as_raw(), EMPTY, Ordering::SeqCst, Ordering::SeqCst);
        }
    }

    pub fn pids(&self) -> Vec<Pid> {
        self.pids
            .iter()
            .map(|cell| cell.load(Ordering::SeqCst))
            .filter(|&raw| raw > 0)
            .map(Pid::from_raw)
            .collect()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pids().is_empty()
    }

    /// Send `signal` to every occupied cell, returning how many were signalled.
    pub fn signal_all(&self, signal: Signal) -> usize {
        self.pids()
            .into_iter()
            .filter(|&pid| match kill(pid, signal) {
                Ok(()) => true,
                Err(errno) => {
                    log::debug!("kill({}, {:?}) failed: {}", pid, signal, errno);
                    false
                }
            })
            .count()
    }
}

/// Interrupt forwarding. The interrupt path only touches atomics and calls
/// `kill`; any visible output is left to the main loop via
/// [`Supervisor::take_interrupt`].
#[derive(Debug, Clone)]
pub struct Supervisor {
    slot: Arc<ForegroundSlot>,
    interrupted: Arc<AtomicBool>,
}

impl Supervisor {
    pub fn new(slot: Arc<ForegroundSlot>) -> Self {
        Supervisor {
            slot,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Install the process-wide SIGINT handler. `ctrlc` only allows this once
    /// per process, so only the interactive entry point calls it.
    pub fn install(&self) -> Result<(), ShellError> {
        let handle = self.clone();
        ctrlc::set_handler(move || {
            handle.deliver_interrupt();
        })
        .map_err(|e| ShellError::Config(format!("cannot install SIGINT handler: {}", e)))
    }

    /// Forward an interrupt to the foreground job, if there is one.
    pub fn deliver_interrupt(&self) -> usize {
        let forwarded = self.slot.signal_all(Signal::SIGINT);
        self.interrupted.store(true, Ordering::SeqCst);
        forwarded
    }

    /// Returns true once per interrupt delivered since the last call.
    pub fn take_interrupt(&self) -> bool {
        self.interrupted.swap(false, Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn slot(&self) -> &Arc<ForegroundSlot> {
        &self.slot
    }
}

/// A countdown against the current foreground job.
///
/// On expiry every pid still in the slot is sent SIGKILL and the slot is
/// cleared. Disarming (or dropping) closes the channel and joins the thread,
/// so no timer outlives the job it was armed for.
pub struct Watchdog {
    disarm: Option<Sender<()>>,
    handle: Option<JoinHandle<bool>>,
}

impl Watchdog {
    pub fn arm(slot: Arc<ForegroundSlot>, timeout: Duration) -> Result<Self, ShellError> {
        let (tx, rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("jobsh-watchdog".to_string())
            .spawn(move || match rx.recv_timeout(timeout) {
                Err(RecvTimeoutError::Timeout) => {
                    let killed = slot.signal_all(Signal::SIGKILL);
                    slot.clear();
                    log::warn!(
                        "foreground job exceeded {:?}, killed {} process(es)",
                        timeout,
                        killed
                    );
                    killed > 0
                }
                _ => false,
            })?;
        Ok(Watchdog {
            disarm: Some(tx),
            handle: Some(handle),
        })
    }

    /// Stop the countdown. Returns true if it had already fired.
    pub fn disarm(mut self) -> bool {
        self.shutdown()
    }

    fn shutdown(&mut self) -> bool {
        drop(self.disarm.take());
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or(false),
            None => false,
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.shutdown();
    }
}
