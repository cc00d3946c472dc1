use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

pub type ShResult<T> = Result<T, ShErr>;

/// Which standard stream a failed redirection was meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirKind {
	Input,
	Output,
	Error,
}

impl std::fmt::Display for RedirKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			RedirKind::Input => write!(f, "input"),
			RedirKind::Output => write!(f, "output"),
			RedirKind::Error => write!(f, "error"),
		}
	}
}

// Errors raised in a forked child never travel back to the parent.
// The child prints them and exits, and the parent only sees the exit status.
#[derive(Debug, Error)]
pub enum ShErr {
	#[error("job table full: at most {0} jobs can be tracked")]
	JobTableFull(usize),

	#[error("{0}: no current job")]
	NoCurrentJob(&'static str),

	#[error("fork failed: {0}")]
	ForkFailed(Errno),

	#[error("Error: cannot open {kind} file '{}'", .path.display())]
	RedirFailed { kind: RedirKind, path: PathBuf },

	#[error("Command not found: {0}")]
	CmdNotFound(String),

	#[error("Permission denied: {0}")]
	BadPermission(String),

	#[error("Syntax Error: {0}")]
	InvalidSyntax(String),

	#[error("I/O Error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("ERRNO: {0}")]
	ErrNo(#[from] Errno),

	#[error("Internal Error: {0}")]
	InternalErr(String),
}

impl ShErr {
	pub fn from_internal(msg: impl Into<String>) -> Self {
		Self::InternalErr(msg.into())
	}

	pub fn syntax(msg: impl Into<String>) -> Self {
		Self::InvalidSyntax(msg.into())
	}

	/// Fatal errors end the read loop. Everything else is reported and the shell carries on.
	pub fn is_fatal(&self) -> bool {
		match self {
			ShErr::IoError(..) => true,
			ShErr::JobTableFull(..)
			| ShErr::NoCurrentJob(..)
			| ShErr::ForkFailed(..)
			| ShErr::RedirFailed { .. }
			| ShErr::CmdNotFound(..)
			| ShErr::BadPermission(..)
			| ShErr::InvalidSyntax(..)
			| ShErr::ErrNo(..)
			| ShErr::InternalErr(..) => false,
		}
	}
}
