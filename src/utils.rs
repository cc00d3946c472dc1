use std::os::fd::{AsRawFd, IntoRawFd, RawFd};
use std::path::Path;

use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{close, dup2, pipe};

use crate::error::ShResult;

/// An owned file descriptor that closes itself when dropped.
///
/// The standard streams (0, 1 and 2) are never closed through a `RustFd`; closing one only
/// forgets it.
#[derive(Hash, Eq, PartialEq, Debug)]
pub struct RustFd {
	fd: RawFd,
}

impl RustFd {
	pub fn new(fd: RawFd) -> Self {
		RustFd { fd }
	}

	/// Wrapper for nix::unistd::pipe(), simply produces two `RustFds` that point to a read and write pipe respectfully
	pub fn pipe() -> ShResult<(Self, Self)> {
		let (r_pipe, w_pipe) = pipe()?;
		Ok((Self::new(r_pipe.into_raw_fd()), Self::new(w_pipe.into_raw_fd())))
	}

	/// Open a file with the given flags, using `mode` as the permission bits if it gets created
	pub fn open(path: &Path, flags: OFlag, mode: Mode) -> ShResult<Self> {
		let fd = open(path, flags, mode)?;
		Ok(Self::new(fd))
	}

	/// Duplicate `self` onto the given target file descriptor. `self` stays open.
	pub fn dup2<T: AsRawFd>(&self, target: &T) -> ShResult<()> {
		let target_fd = target.as_raw_fd();
		if self.fd == target_fd {
			// Nothing to do here
			return Ok(())
		}
		dup2(self.fd, target_fd)?;
		Ok(())
	}

	/// Duplicate `self` onto `target` and close the original
	pub fn dup2_close<T: AsRawFd>(mut self, target: &T) -> ShResult<()> {
		self.dup2(target)?;
		if self.fd == target.as_raw_fd() {
			// It already is the target; don't close it out from under ourselves
			self.fd = -1;
			return Ok(())
		}
		self.close()
	}

	pub fn close(&mut self) -> ShResult<()> {
		if !self.is_valid() {
			return Ok(())
		}
		let fd = std::mem::replace(&mut self.fd, -1);
		if matches!(fd, 0..=2) {
			return Ok(())
		}
		close(fd)?;
		Ok(())
	}

	pub fn is_valid(&self) -> bool {
		self.fd >= 0
	}
}

impl Drop for RustFd {
	fn drop(&mut self) {
		let _ = self.close();
	}
}

impl AsRawFd for RustFd {
	fn as_raw_fd(&self) -> RawFd {
		self.fd
	}
}
