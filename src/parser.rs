//! Turns one input line into a [`CmdLine`].
//!
//! The grammar is deliberately tiny: words split on blanks, the three redirections `<`, `>` and
//! `2>`, at most one `|`, and a trailing `&` on simple commands. The input is never modified; every
//! syntax token is consumed into the returned description instead.

use std::ffi::CString;
use std::path::PathBuf;

use crate::error::{ShErr, ShResult};
use crate::jobs::JobCmdFlags;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Redirs {
	pub input: Option<PathBuf>,
	pub output: Option<PathBuf>,
	pub error: Option<PathBuf>,
}

impl Redirs {
	pub fn is_empty(&self) -> bool {
		self.input.is_none() && self.output.is_none() && self.error.is_none()
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
	pub argv: Vec<String>,
	pub redirs: Redirs,
}

impl Cmd {
	pub fn name(&self) -> &str {
		self.argv.first().map(String::as_str).unwrap_or_default()
	}

	/// argv in the form exec wants it. Built before forking so the child never allocates.
	pub fn c_argv(&self) -> ShResult<Vec<CString>> {
		self.argv.iter()
			.map(|arg| CString::new(arg.as_str()).map_err(|_| ShErr::syntax(format!("argument contains a NUL byte: {:?}", arg))))
			.collect()
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmdLine {
	Empty,
	Jobs(JobCmdFlags),
	Fg(Option<usize>),
	Bg(Option<usize>),
	Simple { cmd: Cmd, background: bool, text: String },
	Pipeline { left: Cmd, right: Cmd, text: String },
}

pub fn parse_line(line: &str) -> ShResult<CmdLine> {
	let text = line.trim_end_matches(['\n', '\r']);
	let mut words = text.split([' ', '\t'])
		.filter(|word| !word.is_empty())
		.collect::<Vec<_>>();

	let Some(first) = words.first() else {
		return Ok(CmdLine::Empty)
	};
	match *first {
		"jobs" => return Ok(CmdLine::Jobs(parse_jobs_flags(&words[1..])?)),
		"fg" => return Ok(CmdLine::Fg(parse_job_id("fg", words.get(1).copied())?)),
		"bg" => return Ok(CmdLine::Bg(parse_job_id("bg", words.get(1).copied())?)),
		_ => { /* External command */ }
	}

	let background = words.last() == Some(&"&");
	if background {
		words.pop();
	}

	let pipes = words.iter()
		.enumerate()
		.filter(|(_, word)| **word == "|")
		.map(|(i, _)| i)
		.collect::<Vec<_>>();

	match pipes.as_slice() {
		[] => {
			let cmd = parse_cmd(&words)?;
			let text = if background {
				strip_background(text)
			} else {
				text.to_string()
			};
			Ok(CmdLine::Simple { cmd, background, text })
		}
		[i] => {
			if background {
				return Err(ShErr::syntax("background pipelines are not supported"))
			}
			let left = parse_cmd(&words[..*i])?;
			let right = parse_cmd(&words[i + 1..])?;
			Ok(CmdLine::Pipeline { left, right, text: text.to_string() })
		}
		_ => Err(ShErr::syntax("only one `|' per line is supported")),
	}
}

fn parse_cmd(words: &[&str]) -> ShResult<Cmd> {
	let mut argv = vec![];
	let mut redirs = Redirs::default();
	let mut words = words.iter();
	while let Some(word) = words.next() {
		let target = match *word {
			"<" => &mut redirs.input,
			">" => &mut redirs.output,
			"2>" => &mut redirs.error,
			_ => {
				argv.push(word.to_string());
				continue
			}
		};
		let Some(file) = words.next() else {
			return Err(ShErr::syntax(format!("expected a file after `{}'", word)))
		};
		*target = Some(PathBuf::from(file));
	}
	if argv.is_empty() {
		return Err(ShErr::syntax("expected a command"))
	}
	Ok(Cmd { argv, redirs })
}

/// Drops the trailing `&` and the blanks before it from the text shown in job listings
fn strip_background(text: &str) -> String {
	let cut = match text.rfind('&') {
		Some(i) => &text[..i],
		None => text,
	};
	cut.trim_end_matches([' ', '\t']).to_string()
}

fn parse_job_id(cmd: &str, arg: Option<&str>) -> ShResult<Option<usize>> {
	let Some(arg) = arg else {
		return Ok(None)
	};
	let digits = arg.strip_prefix('%').unwrap_or(arg);
	match digits.parse::<i64>() {
		Ok(id) if id > 0 => Ok(usize::try_from(id).ok()),
		Ok(_) => Ok(None), // Non-positive ids mean "the current job"
		Err(_) => Err(ShErr::syntax(format!("{}: invalid job id `{}'", cmd, arg))),
	}
}

fn parse_jobs_flags(args: &[&str]) -> ShResult<JobCmdFlags> {
	let mut flags = JobCmdFlags::empty();
	for arg in args {
		let Some(letters) = arg.strip_prefix('-') else {
			return Err(ShErr::syntax(format!("Invalid flag in `jobs' call: {}", arg)))
		};
		for ch in letters.chars() {
			flags |= match ch {
				'p' => JobCmdFlags::PIDS,
				'r' => JobCmdFlags::RUNNING,
				's' => JobCmdFlags::STOPPED,
				_ => return Err(ShErr::syntax(format!("Invalid flag in `jobs' call: -{}", ch))),
			};
		}
	}
	Ok(flags)
}
