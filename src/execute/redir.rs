use std::os::fd::RawFd;
use std::path::Path;

use nix::fcntl::OFlag;
use nix::sys::stat::Mode;

use crate::error::{RedirKind, ShErr, ShResult};
use crate::parser::Redirs;
use crate::utils::RustFd;

const STDIN: RawFd = 0;
const STDOUT: RawFd = 1;
const STDERR: RawFd = 2;

/// rw-rw-r--, before the umask
fn file_mode() -> Mode {
	Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IWGRP | Mode::S_IROTH
}

impl RedirKind {
	fn target_fd(&self) -> RawFd {
		match self {
			RedirKind::Input => STDIN,
			RedirKind::Output => STDOUT,
			RedirKind::Error => STDERR,
		}
	}

	fn open_flags(&self) -> OFlag {
		match self {
			RedirKind::Input => OFlag::O_RDONLY,
			RedirKind::Output | RedirKind::Error => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
		}
	}
}

/// Opens the file a redirection points at, without installing it anywhere
pub fn open_target(path: &Path, kind: RedirKind) -> ShResult<RustFd> {
	RustFd::open(path, kind.open_flags(), file_mode())
		.map_err(|_| ShErr::RedirFailed { kind, path: path.to_path_buf() })
}

/// Installs redirections and pipe ends onto the standard streams of the calling process.
///
/// Meant to run in a forked child right before exec. A named file always beats a pipe end on the
/// same stream; the losing pipe end is closed unused. Every pipe end handed in is either installed
/// or closed by the time this returns, error or not.
pub fn wire_child(redirs: &Redirs, pipe_in: Option<RustFd>, pipe_out: Option<RustFd>) -> ShResult<()> {
	wire_stream(redirs.input.as_deref(), RedirKind::Input, pipe_in)?;
	wire_stream(redirs.output.as_deref(), RedirKind::Output, pipe_out)?;
	wire_stream(redirs.error.as_deref(), RedirKind::Error, None)
}

fn wire_stream(file: Option<&Path>, kind: RedirKind, pipe: Option<RustFd>) -> ShResult<()> {
	match (file, pipe) {
		(Some(path), pipe) => {
			drop(pipe);
			open_target(path, kind)?.dup2_close(&kind.target_fd())
		}
		(None, Some(pipe)) => pipe.dup2_close(&kind.target_fd()),
		(None, None) => Ok(()),
	}
}
