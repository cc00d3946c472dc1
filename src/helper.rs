use std::io::BufRead;

use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::error::{ShErr, ShResult};
use crate::jobs::{JobHandle, JobState};
use crate::shellenv::{self, attach_tty, read_jobs, write_jobs};
use crate::signal::SigchldBlock;

/// Gives `handle` the terminal and blocks until the job finishes or stops.
///
/// With `cont` set the group is sent SIGCONT first. The terminal always goes back to the shell
/// afterwards. A finished job leaves the table; a stopped one stays behind as `Stopped`. Returns
/// the status of the job's last stage, or the stop that ended the wait.
pub fn handle_fg(handle: JobHandle, cont: bool) -> ShResult<Option<WaitStatus>> {
	let _block = SigchldBlock::new()?;
	let Some(pgid) = read_jobs(|j| j.get(handle).map(|job| job.pgid()))? else {
		return Err(ShErr::from_internal("foreground job left the table before it was waited on"))
	};

	if let Err(e) = attach_tty(pgid) {
		warn!("could not hand the terminal to group {}: {}", pgid, e);
	}
	let outcome = wait_fg(pgid, cont);
	if let Err(e) = attach_tty(shellenv::shell_pgrp()) {
		warn!("could not take back the terminal: {}", e);
	}
	let (state, observed) = outcome?;

	if state == JobState::Stopped {
		debug!("foreground group {} stopped", pgid);
		write_jobs(|j| j.get_mut(handle).map(|job| job.set_state(JobState::Stopped)))?;
		return Ok(observed)
	}
	let job = write_jobs(|j| j.release(handle))?;
	debug!("foreground group {} finished", pgid);
	Ok(job.and_then(|job| job.last_status()).or(observed))
}

/// The blocking half of `handle_fg`. Only ever waits on members of `pgid`, never on other jobs.
fn wait_fg(pgid: Pid, cont: bool) -> ShResult<(JobState, Option<WaitStatus>)> {
	if cont {
		if let Err(e) = killpg(pgid, Signal::SIGCONT) {
			// ESRCH: the group already died and the wait below sees ECHILD
			debug!("SIGCONT to group {} failed: {}", pgid, e);
		}
	}
	let group = Pid::from_raw(-pgid.as_raw());
	let mut observed = None;
	loop {
		match waitpid(group, Some(WaitPidFlag::WUNTRACED)) {
			Ok(status) => {
				observed = Some(status);
				match write_jobs(|j| j.reconcile(status))? {
					Some((_, JobState::Stopped)) => return Ok((JobState::Stopped, observed)),
					Some((_, JobState::Done)) => return Ok((JobState::Done, observed)),
					_ => continue,
				}
			}
			Err(Errno::EINTR) => continue,
			// No members left in the group, so the job is over whatever the table says
			Err(Errno::ECHILD) => return Ok((JobState::Done, observed)),
			Err(e) => return Err(e.into()),
		}
	}
}

/// Reads one input line as raw bytes. Returns `None` at end of input.
///
/// Bytes that are not valid UTF-8 become U+FFFD instead of failing the read, so a stray byte costs
/// one bad command and never the whole session.
pub fn read_cmdline<R: BufRead>(input: &mut R, buf: &mut Vec<u8>) -> ShResult<Option<String>> {
	buf.clear();
	if input.read_until(b'\n', buf)? == 0 {
		return Ok(None)
	}
	Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Exit code for a foreground outcome, the way shells report `$?`
pub fn status_code(status: Option<WaitStatus>) -> i32 {
	match status {
		Some(WaitStatus::Exited(_, code)) => code,
		Some(WaitStatus::Signaled(_, sig, _)) | Some(WaitStatus::Stopped(_, sig)) => 128 + sig as i32,
		_ => 0,
	}
}
