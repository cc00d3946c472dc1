use std::os::fd::BorrowedFd;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Mutex;

use log::{debug, warn};
use nix::unistd::{getpgrp, getpid, isatty, setpgid, tcsetpgrp, Pid};
use once_cell::sync::Lazy;

use crate::error::{ShErr, ShResult};
use crate::jobs::JobTable;
use crate::signal::{self, SigchldBlock};

static JOBS: Lazy<Mutex<JobTable>> = Lazy::new(|| Mutex::new(JobTable::new()));

// 0 means "not initialized"; fall back to asking the kernel
static SHELL_PGRP: AtomicI32 = AtomicI32::new(0);
static JOB_CONTROL: AtomicBool = AtomicBool::new(false);

/// Read access to the job table. SIGCHLD stays blocked for the duration of the closure.
pub fn read_jobs<F, T>(f: F) -> ShResult<T>
where
	F: FnOnce(&JobTable) -> T,
{
	let _block = SigchldBlock::new()?;
	let jobs = JOBS.lock().map_err(|_| ShErr::from_internal("job table lock poisoned"))?;
	Ok(f(&jobs))
}

/// Write access to the job table. SIGCHLD stays blocked for the duration of the closure, so the
/// reaper only ever sees whole records.
pub fn write_jobs<F, T>(f: F) -> ShResult<T>
where
	F: FnOnce(&mut JobTable) -> T,
{
	let _block = SigchldBlock::new()?;
	let mut jobs = JOBS.lock().map_err(|_| ShErr::from_internal("job table lock poisoned"))?;
	Ok(f(&mut jobs))
}

pub fn shell_pgrp() -> Pid {
	match SHELL_PGRP.load(Ordering::SeqCst) {
		0 => getpgrp(),
		raw => Pid::from_raw(raw),
	}
}

pub fn job_control_enabled() -> bool {
	JOB_CONTROL.load(Ordering::SeqCst)
}

pub fn tty_fd() -> BorrowedFd<'static> {
	// Stdin stays open for the life of the process
	unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) }
}

/// Hands the terminal to `pgid`. Does nothing unless job control is enabled.
pub fn attach_tty(pgid: Pid) -> ShResult<()> {
	if !job_control_enabled() {
		return Ok(())
	}
	tcsetpgrp(tty_fd(), pgid)?;
	Ok(())
}

/// Puts the shell in its own process group, installs the signal handlers, and takes the terminal
/// if stdin is one.
pub fn init_shell() -> ShResult<()> {
	let shell_pid = getpid();
	if let Err(e) = setpgid(shell_pid, shell_pid) {
		// Session leaders can't move, and they already lead their own group
		warn!("could not move shell into its own process group: {}", e);
	}
	let pgrp = getpgrp();
	SHELL_PGRP.store(pgrp.as_raw(), Ordering::SeqCst);
	Lazy::force(&JOBS);

	let interactive = isatty(libc::STDIN_FILENO).unwrap_or(false);
	JOB_CONTROL.store(interactive, Ordering::SeqCst);

	signal::sig_handler_setup()?;
	if interactive {
		attach_tty(pgrp)?;
	}
	debug!("shell initialized: pgrp={}, job control={}", pgrp, interactive);
	Ok(())
}
