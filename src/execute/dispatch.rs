use std::io::Write;

use nix::sys::wait::WaitStatus;

use crate::builtin::job;
use crate::error::ShResult;
use crate::parser::CmdLine;

use super::{command, pipeline};

/// Runs one parsed line. Returns the status of whatever ran in the foreground, if anything did.
///
/// Builtin output goes to `out`; diagnostics are the caller's to print.
pub fn dispatch_exec<W: Write>(line: CmdLine, out: &mut W) -> ShResult<Option<WaitStatus>> {
	match line {
		CmdLine::Empty => Ok(None),
		CmdLine::Jobs(flags) => {
			job::jobs(flags, out)?;
			Ok(None)
		}
		CmdLine::Fg(job_id) => job::continue_job(job_id, true, out),
		CmdLine::Bg(job_id) => job::continue_job(job_id, false, out),
		CmdLine::Simple { cmd, background, text } => command::exec_cmd(&cmd, &text, background),
		CmdLine::Pipeline { left, right, text } => pipeline::exec_pipeline(&left, &right, &text),
	}
}
