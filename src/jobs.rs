//! The job table.
//!
//! A fixed number of slots, each either empty or holding one [`Job`]. Jobs are addressed by a
//! [`JobHandle`] (the slot index) internally, and by their job id or process group id from the
//! outside. Nothing in here does I/O or sends signals; callers own those side effects.

use std::fmt::{self, Display};

use bitflags::bitflags;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

use crate::error::{ShErr, ShResult};

pub const MAX_JOBS: usize = 40;
pub const MAX_CMDLINE_LEN: usize = 199;

bitflags! {
	#[derive(Debug,Clone,Copy,PartialEq,Eq)]
	pub struct JobCmdFlags: u8 {
		const PIDS    = 0b001;
		const RUNNING = 0b010;
		const STOPPED = 0b100;
	}
}

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum JobState {
	Running,
	Stopped,
	Done,
}

impl Display for JobState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let label = match self {
			JobState::Running => "Running",
			JobState::Stopped => "Stopped",
			JobState::Done => "Done",
		};
		f.pad(label)
	}
}

#[derive(Debug,Clone,Copy,PartialEq,Eq,Hash)]
pub struct JobHandle(usize);

#[derive(Debug,Clone)]
pub struct ChildProc {
	pid: Pid,
	status: Option<WaitStatus>,
}

impl ChildProc {
	pub fn new(pid: Pid) -> Self {
		Self { pid, status: None }
	}
	pub fn pid(&self) -> Pid {
		self.pid
	}
	pub fn is_finished(&self) -> bool {
		matches!(self.status, Some(WaitStatus::Exited(..) | WaitStatus::Signaled(..)))
	}
}

#[derive(Debug,Clone)]
pub struct Job {
	job_id: usize,
	pgid: Pid,
	state: JobState,
	is_bg: bool,
	cmdline: String,
	children: Vec<ChildProc>,
}

impl Job {
	pub fn job_id(&self) -> usize {
		self.job_id
	}
	pub fn pgid(&self) -> Pid {
		self.pgid
	}
	pub fn state(&self) -> JobState {
		self.state
	}
	pub fn is_background(&self) -> bool {
		self.is_bg
	}
	pub fn cmdline(&self) -> &str {
		&self.cmdline
	}
	pub fn children(&self) -> &[ChildProc] {
		&self.children
	}
	pub fn set_state(&mut self, state: JobState) {
		self.state = state;
	}
	pub fn set_background(&mut self, is_bg: bool) {
		self.is_bg = is_bg;
	}
	/// Adds another process to this job's group, e.g. the second stage of a pipeline
	pub fn add_child(&mut self, pid: Pid) {
		if !self.children.iter().any(|chld| chld.pid == pid) {
			self.children.push(ChildProc::new(pid));
		}
	}
	pub fn is_alive(&self) -> bool {
		self.children.iter().any(|chld| !chld.is_finished())
	}
	/// The most recent status of the last stage. This is what a foreground wait reports.
	pub fn last_status(&self) -> Option<WaitStatus> {
		self.children.last().and_then(|chld| chld.status)
	}

	/// Folds one observed status into the job. Returns the resulting job state.
	fn update(&mut self, status: WaitStatus) -> JobState {
		let Some(pid) = status.pid() else {
			return self.state
		};
		if let Some(child) = self.children.iter_mut().find(|chld| chld.pid == pid) {
			child.status = Some(status);
		}
		match status {
			WaitStatus::Stopped(..) => self.state = JobState::Stopped,
			WaitStatus::Continued(..) => self.state = JobState::Running,
			WaitStatus::Exited(..) | WaitStatus::Signaled(..) => {
				if !self.is_alive() {
					self.state = JobState::Done
				}
			}
			_ => { /* Nothing to record */ }
		}
		self.state
	}
}

/// One rendered line of `jobs` output
#[derive(Debug,Clone,PartialEq,Eq)]
pub struct JobRow {
	pub job_id: usize,
	pub current: bool,
	pub pgid: Option<Pid>,
	pub state: JobState,
	pub cmdline: String,
	pub is_bg: bool,
}

impl Display for JobRow {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let marker = if self.current { '+' } else { '-' };
		write!(f, "[{}]{}  ", self.job_id, marker)?;
		if let Some(pgid) = self.pgid {
			write!(f, "{}  ", pgid)?;
		}
		write!(f, "{:<11}{}", self.state, self.cmdline)?;
		// Stopped jobs never carry the background marker
		if self.is_bg && self.state != JobState::Stopped {
			write!(f, "&")?;
		}
		Ok(())
	}
}

#[derive(Debug)]
pub struct JobTable {
	slots: [Option<Job>; MAX_JOBS],
}

impl Default for JobTable {
	fn default() -> Self {
		Self::new()
	}
}

impl JobTable {
	pub fn new() -> Self {
		Self { slots: std::array::from_fn(|_| None) }
	}

	pub fn len(&self) -> usize {
		self.slots.iter().flatten().count()
	}

	pub fn is_empty(&self) -> bool {
		self.slots.iter().all(Option::is_none)
	}

	pub fn is_full(&self) -> bool {
		self.slots.iter().all(Option::is_some)
	}

	fn next_job_id(&self) -> usize {
		self.slots.iter()
			.flatten()
			.map(|job| job.job_id)
			.max()
			.unwrap_or(0) + 1
	}

	/// Takes a free slot for a freshly formed process group. The group leader is recorded as its
	/// first member process.
	pub fn register(&mut self, pgid: Pid, cmdline: &str, state: JobState) -> ShResult<JobHandle> {
		if self.find_by_pgid(pgid).is_some() {
			return Err(ShErr::from_internal(format!("process group {} is already tracked", pgid)))
		}
		let job_id = self.next_job_id();
		let index = self.slots.iter()
			.position(Option::is_none)
			.ok_or(ShErr::JobTableFull(MAX_JOBS))?;

		self.slots[index] = Some(Job {
			job_id,
			pgid,
			state,
			is_bg: false,
			cmdline: truncate_cmdline(cmdline),
			children: vec![ChildProc::new(pgid)],
		});
		Ok(JobHandle(index))
	}

	pub fn release(&mut self, handle: JobHandle) -> Option<Job> {
		self.slots.get_mut(handle.0).and_then(Option::take)
	}

	pub fn get(&self, handle: JobHandle) -> Option<&Job> {
		self.slots.get(handle.0).and_then(Option::as_ref)
	}

	pub fn get_mut(&mut self, handle: JobHandle) -> Option<&mut Job> {
		self.slots.get_mut(handle.0).and_then(Option::as_mut)
	}

	fn find<F: Fn(&Job) -> bool>(&self, pred: F) -> Option<JobHandle> {
		self.slots.iter()
			.position(|slot| slot.as_ref().is_some_and(&pred))
			.map(JobHandle)
	}

	pub fn find_by_pgid(&self, pgid: Pid) -> Option<JobHandle> {
		self.find(|job| job.pgid == pgid)
	}

	pub fn find_by_job_id(&self, job_id: usize) -> Option<JobHandle> {
		self.find(|job| job.job_id == job_id)
	}

	/// Finds the job that a process belongs to. Every member of a job shares the job's process
	/// group, so this also resolves pipeline stages whose pid differs from the pgid.
	pub fn find_by_pid(&self, pid: Pid) -> Option<JobHandle> {
		self.find(|job| job.children.iter().any(|chld| chld.pid == pid))
	}

	/// The live job with the greatest id, i.e. the "current job"
	pub fn most_recent_active(&self) -> Option<JobHandle> {
		self.slots.iter()
			.enumerate()
			.filter_map(|(i, slot)| slot.as_ref().map(|job| (i, job)))
			.filter(|(_, job)| job.state != JobState::Done)
			.max_by_key(|(_, job)| job.job_id)
			.map(|(i, _)| JobHandle(i))
	}

	/// Explicit id if given, otherwise the current job
	pub fn resolve(&self, job_id: Option<usize>) -> Option<JobHandle> {
		match job_id {
			Some(id) => self.find_by_job_id(id),
			None => self.most_recent_active(),
		}
	}

	pub fn list_snapshot(&self) -> Vec<JobHandle> {
		let mut handles = self.slots.iter()
			.enumerate()
			.filter_map(|(i, slot)| slot.as_ref().map(|job| (job.job_id, JobHandle(i))))
			.collect::<Vec<_>>();
		handles.sort_by_key(|(id, _)| *id);
		handles.into_iter().map(|(_, handle)| handle).collect()
	}

	/// Records a status harvested by `waitpid`, whichever path harvested it. Unknown pids are
	/// ignored.
	///
	/// This runs inside the SIGCHLD handler, so it must not allocate.
	pub fn reconcile(&mut self, status: WaitStatus) -> Option<(JobHandle, JobState)> {
		let pid = status.pid()?;
		let handle = self.find_by_pid(pid)?;
		let job = self.get_mut(handle)?;
		let state = job.update(status);
		Some((handle, state))
	}

	/// Produces the `jobs` listing and purges every `Done` job it reported.
	pub fn report(&mut self, flags: JobCmdFlags) -> Vec<JobRow> {
		let current = self.most_recent_active();
		let mut rows = vec![];
		for handle in self.list_snapshot() {
			let Some(job) = self.get(handle) else { continue };
			let shown = match job.state {
				_ if !flags.intersects(JobCmdFlags::RUNNING | JobCmdFlags::STOPPED) => true,
				JobState::Running => flags.contains(JobCmdFlags::RUNNING),
				JobState::Stopped => flags.contains(JobCmdFlags::STOPPED),
				JobState::Done => false,
			};
			if !shown {
				continue
			}
			rows.push(JobRow {
				job_id: job.job_id,
				current: current == Some(handle),
				pgid: flags.contains(JobCmdFlags::PIDS).then_some(job.pgid),
				state: job.state,
				cmdline: job.cmdline.clone(),
				is_bg: job.is_bg,
			});
			if job.state == JobState::Done {
				self.release(handle);
			}
		}
		rows
	}
}

fn truncate_cmdline(cmdline: &str) -> String {
	if cmdline.len() <= MAX_CMDLINE_LEN {
		return cmdline.to_string()
	}
	let mut end = MAX_CMDLINE_LEN;
	while !cmdline.is_char_boundary(end) {
		end -= 1;
	}
	cmdline[..end].to_string()
}
