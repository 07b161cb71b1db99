use std::ffi::CString;
use std::os::raw::c_char;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;

use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::sys::signal::{kill, Signal};
use nix::sys::stat::Mode;
use nix::sys::wait::waitpid;
use nix::unistd::{close, dup2, fork, pipe2, write, ForkResult, Pid};

use crate::ast::{CommandLine, Stage};
use crate::types::{ShellError, EXIT_EXEC_FAILURE, EXIT_REDIRECT_FAILURE};
use crate::utils::{retry_eintr, to_cstring, to_cstrings};

/// Everything a child needs after `fork`, built up front so the child never
/// allocates between `fork` and `exec`.
struct PreparedStage {
    name: String,
    program: CString,
    _argv: Vec<CString>,
    argv_ptrs: Vec<*const c_char>,
    input: Option<CString>,
    output: Option<CString>,
    exec_failed: Vec<u8>,
    input_failed: Vec<u8>,
    output_failed: Vec<u8>,
}

impl PreparedStage {
    fn new(stage: &Stage) -> Result<Self, ShellError> {
        let name = stage.program().to_string();
        let program = to_cstring(&name)?;
        let argv = to_cstrings(&stage.argv)?;
        let mut argv_ptrs: Vec<*const c_char> = argv.iter().map(|a| a.as_ptr()).collect();
        argv_ptrs.push(std::ptr::null());

        let input = stage.redirects.input.as_deref().map(path_cstring).transpose()?;
        let output = stage.redirects.output.as_deref().map(path_cstring).transpose()?;

        Ok(PreparedStage {
            exec_failed: diagnostic_prefix(&name),
            input_failed: stage
                .redirects
                .input
                .as_deref()
                .map(|p| diagnostic_prefix(&p.display().to_string()))
                .unwrap_or_default(),
            output_failed: stage
                .redirects
                .output
                .as_deref()
                .map(|p| diagnostic_prefix(&p.display().to_string()))
                .unwrap_or_default(),
            name,
            program,
            _argv: argv,
            argv_ptrs,
            input,
            output,
        })
    }
}

fn path_cstring(path: &Path) -> Result<CString, ShellError> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| ShellError::InvalidArgument(format!("{} contains a NUL byte", path.display())))
}

fn diagnostic_prefix(subject: &str) -> Vec<u8> {
    format!("jobsh: {}: ", subject).into_bytes()
}

/// Fork the processes for `line` and wire their descriptors.
///
/// Returns the child pids in stage order. The caller owns them from here on
/// and is responsible for reaping them.
pub fn launch(line: &CommandLine) -> Result<Vec<Pid>, ShellError> {
    match line {
        CommandLine::Plain(stage) | CommandLine::Redirected(stage) => {
            let prepared = PreparedStage::new(stage)?;
            Ok(vec![spawn(&prepared, None, None, &[])?])
        }
        CommandLine::Piped { left, right } => launch_pipeline(left, right),
    }
}

/// Both stages run concurrently. The parent closes its copies of the pipe
/// right after forking so the reader sees end-of-stream once the writer exits.
fn launch_pipeline(left: &Stage, right: &Stage) -> Result<Vec<Pid>, ShellError> {
    let left = PreparedStage::new(left)?;
    let right = PreparedStage::new(right)?;

    // close-on-exec so unrelated children forked meanwhile don't hold the
    // write end open; dup2 in the stage children clears the flag on 0/1
    let (read_end, write_end) = pipe2(OFlag::O_CLOEXEC).map_err(|errno| ShellError::LaunchFailure {
        program: "pipe".to_string(),
        errno,
    })?;

    let result = spawn(&left, None, Some(write_end), &[read_end]).and_then(|left_pid| {
        match spawn(&right, Some(read_end), None, &[write_end]) {
            Ok(right_pid) => Ok(vec![left_pid, right_pid]),
            Err(e) => {
                // don't leave the writer behind unreaped
                let _ = kill(left_pid, Signal::SIGKILL);
                let _ = retry_eintr(|| waitpid(left_pid, None));
                Err(e)
            }
        }
    });

    let _ = close(read_end);
    let _ = close(write_end);
    result
}

fn spawn(
    stage: &PreparedStage,
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
    close_fds: &[RawFd],
) -> Result<Pid, ShellError> {
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            log::debug!("forked {} as pid {}", stage.name, child);
            Ok(child)
        }
        Ok(ForkResult::Child) => exec_child(stage, stdin, stdout, close_fds),
        Err(errno) => Err(ShellError::LaunchFailure {
            program: stage.name.clone(),
            errno,
        }),
    }
}

/// Runs in the forked child. Only async-signal-safe calls from here on.
fn exec_child(
    stage: &PreparedStage,
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
    close_fds: &[RawFd],
) -> ! {
    for &fd in close_fds {
        let _ = close(fd);
    }
    if let Some(fd) = stdin {
        replace_fd(fd, libc::STDIN_FILENO);
    }
    if let Some(fd) = stdout {
        replace_fd(fd, libc::STDOUT_FILENO);
    }

    if let Some(path) = &stage.input {
        match retry_eintr(|| open(path.as_c_str(), OFlag::O_RDONLY, Mode::empty())) {
            Ok(fd) => replace_fd(fd, libc::STDIN_FILENO),
            Err(errno) => child_exit(&stage.input_failed, errno, EXIT_REDIRECT_FAILURE),
        }
    }
    if let Some(path) = &stage.output {
        let flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC;
        let mode = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH;
        match retry_eintr(|| open(path.as_c_str(), flags, mode)) {
            Ok(fd) => replace_fd(fd, libc::STDOUT_FILENO),
            Err(errno) => child_exit(&stage.output_failed, errno, EXIT_REDIRECT_FAILURE),
        }
    }

    unsafe { libc::execvp(stage.program.as_ptr(), stage.argv_ptrs.as_ptr()) };
    child_exit(&stage.exec_failed, Errno::last(), EXIT_EXEC_FAILURE)
}

fn replace_fd(fd: RawFd, target: RawFd) {
    if fd == target {
        return;
    }
    if let Err(errno) = retry_eintr(|| dup2(fd, target)) {
        child_exit(b"jobsh: dup2: ", errno, EXIT_REDIRECT_FAILURE);
    }
    let _ = close(fd);
}

fn child_exit(prefix: &[u8], errno: Errno, code: i32) -> ! {
    let _ = write(libc::STDERR_FILENO, prefix);
    let _ = write(libc::STDERR_FILENO, errno.desc().as_bytes());
    let _ = write(libc::STDERR_FILENO, b"\n");
    unsafe { libc::_exit(code) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Redirections;
    use nix::sys::wait::WaitStatus;

    fn stage(argv: &[&str]) -> Stage {
        Stage {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            redirects: Redirections::default(),
        }
    }

    fn exit_code(pid: Pid) -> i32 {
        match retry_eintr(|| waitpid(pid, None)).unwrap() {
            WaitStatus::Exited(_, code) => code,
            other => panic!("unexpected wait status: {:?}", other),
        }
    }

    #[test]
    fn plain_launch_reports_program_status() {
        let pids = launch(&CommandLine::Plain(stage(&["sh", "-c", "exit 7"]))).unwrap();
        assert_eq!(pids.len(), 1);
        assert_eq!(exit_code(pids[0]), 7);
    }

    #[test]
    fn exec_failure_stays_in_the_child() {
        let pids = launch(&CommandLine::Plain(stage(&["jobsh-definitely-not-a-program"]))).unwrap();
        assert_eq!(exit_code(pids[0]), EXIT_EXEC_FAILURE);
    }

    #[test]
    fn missing_input_file_fails_in_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let mut cat = stage(&["cat"]);
        cat.redirects.input = Some(dir.path().join("nope.txt"));
        let pids = launch(&CommandLine::Redirected(cat)).unwrap();
        assert_eq!(exit_code(pids[0]), EXIT_REDIRECT_FAILURE);
    }

    #[test]
    fn pipeline_returns_both_pids() {
        let pids = launch(&CommandLine::Piped {
            left: stage(&["true"]),
            right: stage(&["cat"]),
        })
        .unwrap();
        assert_eq!(pids.len(), 2);
        for pid in pids {
            assert_eq!(exit_code(pid), 0);
        }
    }

    #[test]
    fn nul_bytes_are_rejected_before_fork() {
        let result = launch(&CommandLine::Plain(stage(&["echo", "a\0b"])));
        assert!(matches!(result, Err(ShellError::InvalidArgument(_))));
    }
}
