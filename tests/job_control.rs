use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use jobsh::builtin::job;
use jobsh::error::{ShErr, ShResult};
use jobsh::execute::dispatch::dispatch_exec;
use jobsh::jobs::{JobCmdFlags, JobState};
use jobsh::parser;
use jobsh::shellenv::{read_jobs, write_jobs};
use jobsh::signal::reap_children;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::WaitStatus;
use nix::unistd::{getpgid, Pid};

// Every test here shares the one process-wide job table
static SERIAL: Mutex<()> = Mutex::new(());

fn run(line: &str, out: &mut Vec<u8>) -> ShResult<Option<WaitStatus>> {
    dispatch_exec(parser::parse_line(line)?, out)
}

fn listing() -> String {
    let mut out = vec![];
    job::jobs(JobCmdFlags::empty(), &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

fn wait_until<F: FnMut() -> bool>(mut cond: F) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for job state");
        thread::sleep(Duration::from_millis(20));
    }
}

fn state_of(job_id: usize) -> Option<JobState> {
    read_jobs(|j| j.find_by_job_id(job_id).and_then(|h| j.get(h)).map(|job| job.state())).unwrap()
}

fn first_pgid() -> Option<Pid> {
    read_jobs(|j| {
        j.list_snapshot()
            .first()
            .and_then(|h| j.get(*h))
            .map(|job| job.pgid())
    })
    .unwrap()
}

/// Stops whatever job shows up first in the table, from another thread
fn stop_first_job() -> thread::JoinHandle<()> {
    thread::spawn(|| {
        let mut pgid = None;
        wait_until(|| {
            pgid = first_pgid();
            pgid.is_some()
        });
        if let Some(pgid) = pgid {
            killpg(pgid, Signal::SIGSTOP).unwrap();
        }
    })
}

fn kill_all_jobs() {
    let pgids = read_jobs(|j| {
        j.list_snapshot()
            .into_iter()
            .filter_map(|h| j.get(h).map(|job| job.pgid()))
            .collect::<Vec<_>>()
    })
    .unwrap();
    for pgid in pgids {
        let _ = killpg(pgid, Signal::SIGKILL);
    }
    wait_until(|| {
        reap_children();
        read_jobs(|j| {
            j.list_snapshot()
                .iter()
                .all(|h| j.get(*h).is_some_and(|job| job.state() == JobState::Done))
        })
        .unwrap()
    });
    write_jobs(|j| j.report(JobCmdFlags::empty())).unwrap();
    assert!(read_jobs(|j| j.is_empty()).unwrap());
}

fn scratch_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("jobsh-jc-{}-{}", std::process::id(), name))
}

#[test]
fn background_job_is_reported_done_once() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mut out = vec![];

    assert!(run("sleep 0.2 &", &mut out).unwrap().is_none());
    assert!(out.is_empty());
    assert_eq!(listing(), "[1]+  Running    sleep 0.2&\n");

    wait_until(|| {
        reap_children();
        state_of(1) == Some(JobState::Done)
    });
    assert_eq!(listing(), "[1]-  Done       sleep 0.2&\n");
    assert_eq!(listing(), "");
    assert!(read_jobs(|j| j.is_empty()).unwrap());
}

#[test]
fn foreground_command_leaves_no_job() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mut out = vec![];

    let status = run("true", &mut out).unwrap();
    assert!(matches!(status, Some(WaitStatus::Exited(_, 0))));
    let status = run("false", &mut out).unwrap();
    assert!(matches!(status, Some(WaitStatus::Exited(_, 1))));
    assert!(read_jobs(|j| j.is_empty()).unwrap());
}

#[test]
fn pipeline_reports_last_stage() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mut out = vec![];

    let status = run("false | true", &mut out).unwrap();
    assert!(matches!(status, Some(WaitStatus::Exited(_, 0))));
    let status = run("true | false", &mut out).unwrap();
    assert!(matches!(status, Some(WaitStatus::Exited(_, 1))));
    assert!(read_jobs(|j| j.is_empty()).unwrap());
}

#[test]
fn pipeline_carries_data() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mut out = vec![];
    let path = scratch_file("pipe");

    let status = run(&format!("echo hello | cat > {}", path.display()), &mut out).unwrap();
    assert!(matches!(status, Some(WaitStatus::Exited(_, 0))));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn file_redirection_beats_the_pipe() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mut out = vec![];
    let left = scratch_file("left");
    let right = scratch_file("right");

    // The reader must still see end of stream even though the writer never used the pipe
    let line = format!("echo hi > {} | cat > {}", left.display(), right.display());
    let status = run(&line, &mut out).unwrap();
    assert!(matches!(status, Some(WaitStatus::Exited(_, 0))));
    assert_eq!(std::fs::read_to_string(&left).unwrap(), "hi\n");
    assert_eq!(std::fs::read_to_string(&right).unwrap(), "");
    std::fs::remove_file(&left).unwrap();
    std::fs::remove_file(&right).unwrap();
}

#[test]
fn child_failures_show_up_as_exit_codes() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mut out = vec![];

    let status = run("cat < /nonexistent/input.txt", &mut out).unwrap();
    assert!(matches!(status, Some(WaitStatus::Exited(_, 1))));
    let status = run("jobsh-no-such-program --flag", &mut out).unwrap();
    assert!(matches!(status, Some(WaitStatus::Exited(_, 127))));
    let status = run("true | jobsh-no-such-program", &mut out).unwrap();
    assert!(matches!(status, Some(WaitStatus::Exited(_, 127))));
    assert!(read_jobs(|j| j.is_empty()).unwrap());
}

#[test]
fn stopped_foreground_job_stays_registered() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mut out = vec![];

    let stopper = stop_first_job();
    let status = run("sleep 5", &mut out).unwrap();
    stopper.join().unwrap();
    assert!(matches!(status, Some(WaitStatus::Stopped(_, Signal::SIGSTOP))));
    assert_eq!(state_of(1), Some(JobState::Stopped));
    assert_eq!(listing(), "[1]+  Stopped    sleep 5\n");

    assert!(run("bg", &mut out).unwrap().is_none());
    assert_eq!(String::from_utf8(out.clone()).unwrap(), "[1]+ sleep 5 &\n");
    assert_eq!(state_of(1), Some(JobState::Running));
    assert_eq!(listing(), "[1]+  Running    sleep 5&\n");

    kill_all_jobs();
}

#[test]
fn fg_resumes_and_waits() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mut out = vec![];

    let stopper = stop_first_job();
    run("sleep 0.5", &mut out).unwrap();
    stopper.join().unwrap();
    assert_eq!(state_of(1), Some(JobState::Stopped));

    let status = run("fg %1", &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "sleep 0.5\n");
    assert!(matches!(status, Some(WaitStatus::Exited(_, 0))));
    assert!(read_jobs(|j| j.is_empty()).unwrap());
}

#[test]
fn bg_rejects_jobs_that_are_not_stopped() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mut out = vec![];

    run("sleep 5 &", &mut out).unwrap();
    let err = run("bg", &mut out).unwrap_err();
    assert!(matches!(err, ShErr::NoCurrentJob("bg")));
    let err = run("bg 7", &mut out).unwrap_err();
    assert!(matches!(err, ShErr::NoCurrentJob("bg")));
    assert!(out.is_empty());
    assert_eq!(state_of(1), Some(JobState::Running));
    assert_eq!(listing(), "[1]+  Running    sleep 5&\n");

    kill_all_jobs();
}

#[test]
fn fg_without_jobs_is_an_error() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mut out = vec![];

    let err = run("fg", &mut out).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"fg: no current job");
    assert!(!err.is_fatal());
}

#[test]
fn reaper_ignores_unknown_children() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());

    // Not launched through the shell, so no job owns it
    let mut child = std::process::Command::new("true").spawn().unwrap();
    wait_until(|| reap_children() > 0);
    // Already harvested by the reaper
    assert!(child.wait().is_err());
    assert!(read_jobs(|j| j.is_empty()).unwrap());
}

#[test]
fn fg_without_id_takes_the_running_background_job() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mut out = vec![];

    assert!(run("sleep 0.3 &", &mut out).unwrap().is_none());
    let status = run("fg", &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "sleep 0.3\n");
    assert!(matches!(status, Some(WaitStatus::Exited(_, 0))));
    assert!(read_jobs(|j| j.is_empty()).unwrap());
}

#[test]
fn reaper_records_a_stopped_background_job() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mut out = vec![];

    run("sleep 5 &", &mut out).unwrap();
    let pgid = first_pgid().unwrap();
    killpg(pgid, Signal::SIGSTOP).unwrap();
    wait_until(|| {
        reap_children();
        state_of(1) == Some(JobState::Stopped)
    });
    assert_eq!(listing(), "[1]+  Stopped    sleep 5\n");

    kill_all_jobs();
}

#[test]
fn pipeline_stages_share_one_group() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mut out = vec![];

    let stopper = stop_first_job();
    let status = run("sleep 5 | sleep 5", &mut out).unwrap();
    stopper.join().unwrap();
    assert!(matches!(status, Some(WaitStatus::Stopped(_, Signal::SIGSTOP))));

    let (pgid, members) = read_jobs(|j| {
        let job = j.find_by_job_id(1).and_then(|h| j.get(h)).unwrap();
        let members = job.children().iter().map(|chld| chld.pid()).collect::<Vec<_>>();
        (job.pgid(), members)
    })
    .unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(members[0], pgid);
    for pid in members {
        assert_eq!(getpgid(Some(pid)).unwrap(), pgid);
    }

    kill_all_jobs();
}
