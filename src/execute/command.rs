use log::debug;
use nix::sys::wait::WaitStatus;
use nix::unistd::{fork, setpgid, ForkResult};

use crate::error::{ShErr, ShResult};
use crate::execute;
use crate::helper;
use crate::jobs::{JobState, MAX_JOBS};
use crate::parser::Cmd;
use crate::shellenv::{read_jobs, write_jobs};
use crate::signal::SigchldBlock;

/// Runs one external command as a job of its own.
///
/// In the foreground this blocks until the job finishes or stops and returns what was observed.
/// In the background it returns `None` right after the job is registered.
pub fn exec_cmd(cmd: &Cmd, text: &str, background: bool) -> ShResult<Option<WaitStatus>> {
	if read_jobs(|j| j.is_full())? {
		return Err(ShErr::JobTableFull(MAX_JOBS))
	}
	let argv = cmd.c_argv()?;

	// Held until the job is registered, so the reaper can't see the child before the table does
	let _block = SigchldBlock::new()?;
	let child = match unsafe { fork() } {
		Ok(ForkResult::Child) => execute::enter_child(None, cmd, &argv, None, None),
		Ok(ForkResult::Parent { child }) => child,
		Err(e) => return Err(ShErr::ForkFailed(e)),
	};
	// The child does this too; whichever runs first wins
	let _ = setpgid(child, child);

	let handle = match write_jobs(|j| j.register(child, text, JobState::Running))? {
		Ok(handle) => handle,
		Err(e) => {
			execute::abandon_group(child);
			return Err(e)
		}
	};
	debug!("launched `{}' as group {}", cmd.name(), child);

	if background {
		write_jobs(|j| j.get_mut(handle).map(|job| job.set_background(true)))?;
		return Ok(None)
	}
	helper::handle_fg(handle, false)
}
