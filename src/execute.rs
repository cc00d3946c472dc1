pub mod command;
pub mod dispatch;
pub mod pipeline;
pub mod redir;

use std::ffi::CString;

use log::warn;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::{execvp, setpgid, Pid};

use crate::error::ShErr;
use crate::parser::Cmd;
use crate::signal;
use crate::utils::RustFd;

/// Exit status of a child whose program could not be executed
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit status of a child whose redirections could not be set up
pub const EXIT_REDIR_FAILED: i32 = 1;

/// Everything a freshly forked child does before it turns into `cmd`.
///
/// `pgid` is the group to join; `None` starts a new group led by the child itself.
pub fn enter_child(pgid: Option<Pid>, cmd: &Cmd, argv: &[CString], pipe_in: Option<RustFd>, pipe_out: Option<RustFd>) -> ! {
	let _ = setpgid(Pid::from_raw(0), pgid.unwrap_or(Pid::from_raw(0)));
	signal::reset_child_signals();
	if let Err(e) = redir::wire_child(&cmd.redirs, pipe_in, pipe_out) {
		eprintln!("{}", e);
		child_exit(EXIT_REDIR_FAILED)
	}
	exec_external(argv)
}

pub fn exec_external(argv: &[CString]) -> ! {
	let Some(command) = argv.first() else {
		child_exit(EXIT_NOT_FOUND)
	};
	let e = match execvp(command, argv) {
		Ok(never) => match never {},
		Err(e) => e,
	};
	let name = command.to_string_lossy().into_owned();
	let error = match e {
		Errno::EACCES => ShErr::BadPermission(name),
		Errno::ENOENT | Errno::ENOTDIR => ShErr::CmdNotFound(name),
		_ => ShErr::ErrNo(e),
	};
	eprintln!("{}", error);
	child_exit(EXIT_NOT_FOUND)
}

/// Leaves the child without running any of the parent's exit machinery
fn child_exit(code: i32) -> ! {
	unsafe { libc::_exit(code) }
}

/// Kills and reaps a group the shell could not take ownership of
pub fn abandon_group(pgid: Pid) {
	warn!("abandoning process group {}", pgid);
	let _ = killpg(pgid, Signal::SIGKILL);
	let _ = killpg(pgid, Signal::SIGCONT);
	loop {
		match waitpid(Pid::from_raw(-pgid.as_raw()), Some(WaitPidFlag::empty())) {
			Ok(_) | Err(Errno::EINTR) => continue,
			Err(_) => break,
		}
	}
}
