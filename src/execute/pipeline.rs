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
use crate::utils::RustFd;

/// Runs `left | right` as one foreground job.
///
/// Both stages share a process group led by the left stage. The call returns once both stages
/// have finished, or as soon as either one stops. Pipelines never run in the background.
pub fn exec_pipeline(left: &Cmd, right: &Cmd, text: &str) -> ShResult<Option<WaitStatus>> {
	if read_jobs(|j| j.is_full())? {
		return Err(ShErr::JobTableFull(MAX_JOBS))
	}
	let left_argv = left.c_argv()?;
	let right_argv = right.c_argv()?;

	let _block = SigchldBlock::new()?;
	let (r_pipe, w_pipe) = RustFd::pipe()?;

	let pgid = match unsafe { fork() } {
		Ok(ForkResult::Child) => {
			drop(r_pipe);
			execute::enter_child(None, left, &left_argv, None, Some(w_pipe))
		}
		Ok(ForkResult::Parent { child }) => child,
		Err(e) => return Err(ShErr::ForkFailed(e)),
	};
	let _ = setpgid(pgid, pgid);

	let right_pid = match unsafe { fork() } {
		Ok(ForkResult::Child) => {
			drop(w_pipe);
			execute::enter_child(Some(pgid), right, &right_argv, Some(r_pipe), None)
		}
		Ok(ForkResult::Parent { child }) => child,
		Err(e) => {
			// The pipe ends close on the way out
			execute::abandon_group(pgid);
			return Err(ShErr::ForkFailed(e))
		}
	};
	let _ = setpgid(right_pid, pgid);

	// The shell never touches the pipe itself; holding the write end would keep the reader waiting
	drop(r_pipe);
	drop(w_pipe);

	let registered = write_jobs(|j| {
		let handle = j.register(pgid, text, JobState::Running)?;
		if let Some(job) = j.get_mut(handle) {
			job.add_child(right_pid);
		}
		Ok::<_, ShErr>(handle)
	})?;
	let handle = match registered {
		Ok(handle) => handle,
		Err(e) => {
			execute::abandon_group(pgid);
			return Err(e)
		}
	};
	debug!("launched pipeline `{} | {}' as group {}", left.name(), right.name(), pgid);

	helper::handle_fg(handle, false)
}
