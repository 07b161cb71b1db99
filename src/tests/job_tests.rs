use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::waitpid;
use tempfile::tempdir;

use super::{run_line, shell_with_timeout};
use crate::job::JobOutcome;
use crate::shell::LineOutcome;
use crate::types::ShellError;

#[test]
fn test_exit_status_passthrough() -> Result<(), ShellError> {
    let mut shell = shell_with_timeout(10_000);
    let dir = tempdir()?;
    let script = dir.path().join("exit42.sh");
    fs::write(&script, "exit 42\n")?;

    assert_eq!(run_line(&mut shell, "true")?, LineOutcome::Job(JobOutcome::Exited(0)));
    assert_eq!(run_line(&mut shell, "false")?, LineOutcome::Job(JobOutcome::Exited(1)));
    assert_eq!(
        run_line(&mut shell, &format!("sh {}", script.display()))?,
        LineOutcome::Job(JobOutcome::Exited(42))
    );
    Ok(())
}

#[test]
fn test_empty_line_and_exit() -> Result<(), ShellError> {
    let mut shell = shell_with_timeout(10_000);
    assert_eq!(run_line(&mut shell, "   ")?, LineOutcome::Empty);
    assert_eq!(run_line(&mut shell, "exit")?, LineOutcome::Exit);
    Ok(())
}

#[test]
fn test_background_does_not_block() -> Result<(), ShellError> {
    let mut shell = shell_with_timeout(10_000);

    let started = Instant::now();
    let outcome = run_line(&mut shell, "sleep 5 &")?;
    assert!(started.elapsed() < Duration::from_secs(2));

    let LineOutcome::Job(JobOutcome::Background { pids }) = outcome else {
        panic!("expected a background job, got {:?}", outcome);
    };
    assert_eq!(pids.len(), 1);
    assert!(shell.jobs().foreground().is_empty());
    assert_eq!(shell.jobs().background_jobs().len(), 1);

    // the pid is a live handle
    assert!(kill(pids[0], None).is_ok());
    assert!(shell.reap_background().is_empty());

    kill(pids[0], Signal::SIGTERM).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    let finished = loop {
        let finished = shell.reap_background();
        if !finished.is_empty() || Instant::now() > deadline {
            break finished;
        }
        thread::sleep(Duration::from_millis(20));
    };
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].pids, pids);
    assert_eq!(finished[0].status, Some(128 + Signal::SIGTERM as i32));
    assert!(shell.jobs().background_jobs().is_empty());

    Ok(())
}

#[test]
fn test_background_status_collected_elsewhere_is_unknown() -> Result<(), ShellError> {
    let mut shell = shell_with_timeout(10_000);

    let outcome = run_line(&mut shell, "sleep 5 &")?;
    let LineOutcome::Job(JobOutcome::Background { pids }) = outcome else {
        panic!("expected a background job, got {:?}", outcome);
    };
    kill(pids[0], Signal::SIGKILL).unwrap();
    waitpid(pids[0], None).unwrap();

    let finished = shell.reap_background();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].status, None);
    assert!(shell.jobs().background_jobs().is_empty());
    Ok(())
}

#[test]
fn test_reaped_stage_leaves_the_foreground_slot() -> Result<(), ShellError> {
    let mut shell = shell_with_timeout(10_000);
    let supervisor = shell.supervisor().clone();

    // the left stage exits at once; look at the slot while the right one runs
    let observer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(700));
        let pids = supervisor.slot().pids();
        let alive = pids.iter().all(|&pid| kill(pid, None).is_ok());
        (pids, alive)
    });

    let outcome = run_line(&mut shell, "true | sleep 1.5")?;
    let (during, alive) = observer.join().unwrap();

    assert_eq!(outcome, LineOutcome::Job(JobOutcome::Exited(0)));
    assert_eq!(during.len(), 1, "slot held {:?}", during);
    assert!(alive);
    assert!(shell.jobs().foreground().is_empty());
    Ok(())
}

#[test]
fn test_foreground_timeout_kills() -> Result<(), ShellError> {
    let mut shell = shell_with_timeout(1_000);

    let started = Instant::now();
    let outcome = run_line(&mut shell, "sleep 10")?;
    let elapsed = started.elapsed();

    assert!(
        matches!(outcome, LineOutcome::Job(JobOutcome::TimedOut { .. })),
        "got {:?}",
        outcome
    );
    assert!(elapsed >= Duration::from_millis(900));
    assert!(elapsed < Duration::from_secs(5));
    assert!(shell.jobs().foreground().is_empty());

    // the shell keeps going after a timeout
    assert_eq!(run_line(&mut shell, "true")?, LineOutcome::Job(JobOutcome::Exited(0)));
    Ok(())
}

#[test]
fn test_timeout_kills_both_pipeline_stages() -> Result<(), ShellError> {
    let mut shell = shell_with_timeout(1_000);

    let started = Instant::now();
    let outcome = run_line(&mut shell, "sleep 10 | sleep 10")?;
    assert!(matches!(outcome, LineOutcome::Job(JobOutcome::TimedOut { .. })));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(shell.jobs().foreground().is_empty());
    Ok(())
}

#[test]
fn test_completed_job_leaves_no_stale_timer() -> Result<(), ShellError> {
    // first job's timer would fire at 2.0s, in the middle of the second job
    // (1.2s..2.7s); the second job's own timer fires at 3.2s
    let mut shell = shell_with_timeout(2_000);

    assert_eq!(run_line(&mut shell, "true")?, LineOutcome::Job(JobOutcome::Exited(0)));
    thread::sleep(Duration::from_millis(1_200));
    assert_eq!(
        run_line(&mut shell, "sleep 1.5")?,
        LineOutcome::Job(JobOutcome::Exited(0))
    );
    Ok(())
}

#[test]
fn test_setenv_then_substitution() -> Result<(), ShellError> {
    let mut shell = shell_with_timeout(10_000);
    let dir = tempdir()?;
    let out = dir.path().join("env.txt");

    assert_eq!(
        run_line(&mut shell, "setenv JOBSH_JOB_FOO bar")?,
        LineOutcome::Builtin(0)
    );
    run_line(&mut shell, &format!("echo $JOBSH_JOB_FOO > {}", out.display()))?;
    assert_eq!(fs::read_to_string(&out)?, "bar\n");

    // unset references are dropped, not passed as empty arguments
    run_line(
        &mut shell,
        &format!("echo a $JOBSH_JOB_NEVER_SET b > {}", out.display()),
    )?;
    assert_eq!(fs::read_to_string(&out)?, "a b\n");
    Ok(())
}

#[test]
fn test_interrupt_reaches_foreground_job() -> Result<(), ShellError> {
    let mut shell = shell_with_timeout(10_000);
    let supervisor = shell.supervisor().clone();

    let interrupter = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(5);
        while supervisor.slot().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        supervisor.deliver_interrupt()
    });

    let started = Instant::now();
    let outcome = run_line(&mut shell, "sleep 10")?;
    assert_eq!(interrupter.join().unwrap(), 1);
    assert_eq!(outcome, LineOutcome::Job(JobOutcome::Signaled(Signal::SIGINT)));
    assert!(started.elapsed() < Duration::from_secs(5));

    // the notice is pending for the main loop, and the shell still works
    assert!(shell.supervisor().take_interrupt());
    assert_eq!(run_line(&mut shell, "true")?, LineOutcome::Job(JobOutcome::Exited(0)));
    Ok(())
}

#[test]
fn test_builtins_run_in_process() -> Result<(), ShellError> {
    let mut shell = shell_with_timeout(10_000);
    let mut out = Vec::new();

    let outcome = shell.execute_line("echo one two", &mut out)?;
    assert_eq!(outcome, LineOutcome::Builtin(0));
    assert_eq!(String::from_utf8(out).unwrap(), "one two\n");
    assert!(shell.jobs().background_jobs().is_empty());
    Ok(())
}
