use std::io::Write;

use log::debug;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::WaitStatus;

use crate::error::{ShErr, ShResult};
use crate::helper;
use crate::jobs::{JobCmdFlags, JobState};
use crate::shellenv::{read_jobs, write_jobs};
use crate::signal::SigchldBlock;

/// `fg` when `fg` is set, `bg` otherwise.
///
/// `fg` echoes the job's command, hands it the terminal and waits on it. `bg` only accepts a
/// stopped job; it prints a notice, resumes the group and returns at once.
///
/// A job already marked Done is never a target, even by explicit id: there is nothing left to wait
/// on, and `jobs` still owes the user its Done row.
pub fn continue_job<W: Write>(job_id: Option<usize>, fg: bool, out: &mut W) -> ShResult<Option<WaitStatus>> {
	let cmd_name = if fg { "fg" } else { "bg" };
	// Nothing gets reaped between picking the job and acting on it
	let _block = SigchldBlock::new()?;

	let target = read_jobs(|j| {
		let handle = j.resolve(job_id)?;
		let job = j.get(handle)?;
		Some((handle, job.job_id(), job.pgid(), job.state(), job.cmdline().to_string()))
	})?;
	let Some((handle, id, pgid, state, cmdline)) = target else {
		return Err(ShErr::NoCurrentJob(cmd_name))
	};

	if fg {
		if state == JobState::Done {
			return Err(ShErr::NoCurrentJob(cmd_name))
		}
		writeln!(out, "{}", cmdline)?;
		out.flush()?;
		debug!("job {} moved to the foreground", id);
		write_jobs(|j| j.get_mut(handle).map(|job| {
			job.set_background(false);
			job.set_state(JobState::Running);
		}))?;
		return helper::handle_fg(handle, true)
	}

	if state != JobState::Stopped {
		return Err(ShErr::NoCurrentJob(cmd_name))
	}
	// The table only says Running once the group was actually continued
	killpg(pgid, Signal::SIGCONT)?;
	writeln!(out, "[{}]+ {} &", id, cmdline.trim_end_matches('\n'))?;
	out.flush()?;
	write_jobs(|j| j.get_mut(handle).map(|job| {
		job.set_background(true);
		job.set_state(JobState::Running);
	}))?;
	debug!("job {} resumed in the background", id);
	Ok(None)
}

pub fn jobs<W: Write>(flags: JobCmdFlags, out: &mut W) -> ShResult<()> {
	let rows = write_jobs(|j| j.report(flags))?;
	for row in rows {
		writeln!(out, "{}", row)?;
	}
	out.flush()?;
	Ok(())
}
