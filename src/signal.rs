use nix::errno::Errno;
use nix::sys::signal::{killpg, sigaction, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::tcgetpgrp;

use crate::error::ShResult;
use crate::shellenv::{self, write_jobs};

/// Signals the shell itself must never act on. Children get the defaults back before exec.
const IGNORED: [Signal; 4] = [
	Signal::SIGINT,
	Signal::SIGQUIT,
	Signal::SIGTTIN,
	Signal::SIGTTOU,
];

/// Keeps SIGCHLD from being delivered to this thread while alive.
///
/// Every multi-step touch of the job table happens under one of these, so the reaper can never
/// run in the middle of it. Guards nest: each restores the mask it found.
pub struct SigchldBlock {
	old_mask: SigSet,
}

impl SigchldBlock {
	pub fn new() -> ShResult<Self> {
		let mut set = SigSet::empty();
		set.add(Signal::SIGCHLD);
		let old_mask = set.thread_swap_mask(SigmaskHow::SIG_BLOCK)?;
		Ok(Self { old_mask })
	}
}

impl Drop for SigchldBlock {
	fn drop(&mut self) {
		let _ = self.old_mask.thread_set_mask();
	}
}

pub fn sig_handler_setup() -> ShResult<()> {
	let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
	let sigchld = SigAction::new(SigHandler::Handler(handle_sigchld), SaFlags::SA_RESTART, SigSet::empty());
	let sigtstp = SigAction::new(SigHandler::Handler(handle_sigtstp), SaFlags::SA_RESTART, SigSet::empty());
	unsafe {
		for sig in IGNORED {
			sigaction(sig, &ignore)?;
		}
		sigaction(Signal::SIGCHLD, &sigchld)?;
		sigaction(Signal::SIGTSTP, &sigtstp)?;
	}
	Ok(())
}

/// Runs in a freshly forked child, before exec. Undoes everything `sig_handler_setup` did and
/// clears the signal mask inherited from the launcher.
pub fn reset_child_signals() {
	let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
	for sig in IGNORED.into_iter().chain([Signal::SIGCHLD, Signal::SIGTSTP]) {
		let _ = unsafe { sigaction(sig, &default) };
	}
	let _ = SigSet::empty().thread_set_mask();
}

extern "C" fn handle_sigchld(_: libc::c_int) {
	let saved = Errno::last_raw();
	reap_children();
	Errno::set_raw(saved);
}

extern "C" fn handle_sigtstp(_: libc::c_int) {
	let saved = Errno::last_raw();
	relay_stop();
	Errno::set_raw(saved);
}

/// Harvests every pending child state change without blocking and folds each one into the job
/// table. Returns the number of statuses harvested.
///
/// Called from the SIGCHLD handler; nothing in here may allocate or log.
pub fn reap_children() -> usize {
	let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED;
	let mut harvested = 0;
	loop {
		match waitpid(None, Some(flags)) {
			Ok(WaitStatus::StillAlive) => break,
			Ok(status) => {
				harvested += 1;
				let _ = write_jobs(|j| j.reconcile(status));
			}
			Err(Errno::EINTR) => continue,
			Err(_) => break, // ECHILD, no children left at all
		}
	}
	harvested
}

/// Forwards a keyboard stop to whichever group owns the terminal, unless that is the shell.
/// Returns true if a stop was sent.
pub fn relay_stop() -> bool {
	let Ok(fg_pgrp) = tcgetpgrp(shellenv::tty_fd()) else {
		return false
	};
	if fg_pgrp == shellenv::shell_pgrp() {
		return false
	}
	killpg(fg_pgrp, Signal::SIGTSTP).is_ok()
}
