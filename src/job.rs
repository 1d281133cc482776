use std::ffi::{CStr, CString};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::errno::Errno;
use nix::fcntl::{self, FcntlArg, FdFlag};
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::types::Argv;

/// Exit status of a child whose program does not exist.
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit status of a child that failed to exec for any other reason.
pub const EXIT_CANNOT_EXEC: i32 = 126;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ExitStatus {
	Exited(i32),
	Signaled(Signal),
}

impl ExitStatus {
	/// The status as a shell reports it: signals map to `128 + signo`.
	pub fn code(self) -> i32 {
		match self {
			ExitStatus::Exited(code) => code,
			ExitStatus::Signaled(sig) => 128 + sig as i32,
		}
	}

	pub fn success(self) -> bool {
		self == ExitStatus::Exited(0)
	}

	pub fn is_exec_failure(self) -> bool {
		match self {
			ExitStatus::Exited(EXIT_NOT_FOUND) | ExitStatus::Exited(EXIT_CANNOT_EXEC) => true,
			_ => false,
		}
	}
}

trait WaitStatusExt {
	fn exit_status(self) -> Option<ExitStatus>;
}

impl WaitStatusExt for WaitStatus {
	fn exit_status(self) -> Option<ExitStatus> {
		match self {
			WaitStatus::Exited(_, code) => Some(ExitStatus::Exited(code)),
			WaitStatus::Signaled(_, sig, _) => Some(ExitStatus::Signaled(sig)),
			_ => None,
		}
	}
}

/// Descriptor changes a child makes between `fork` and `exec`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Plumbing {
	/// Pipe end the child has no use for.
	unused: Option<RawFd>,
	/// `(fd, stream)`: `fd` is duplicated onto `stream`, then closed.
	redirect: Option<(RawFd, RawFd)>,
}

impl Plumbing {
	pub fn inherit() -> Plumbing {
		Plumbing::default()
	}

	pub fn stdout_to(write: &OwnedFd, read: &OwnedFd) -> Plumbing {
		Plumbing {
			unused: Some(read.as_raw_fd()),
			redirect: Some((write.as_raw_fd(), libc::STDOUT_FILENO)),
		}
	}

	pub fn stdin_from(read: &OwnedFd, write: &OwnedFd) -> Plumbing {
		Plumbing {
			unused: Some(write.as_raw_fd()),
			redirect: Some((read.as_raw_fd(), libc::STDIN_FILENO)),
		}
	}

	// dup2 must come before closing the original.
	fn apply(self) -> nix::Result<()> {
		if let Some(fd) = self.unused {
			unistd::close(fd)?;
		}
		if let Some((fd, stream)) = self.redirect {
			if fd == stream {
				// Already in place, but still marked close-on-exec.
				fcntl::fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty()))?;
			} else {
				unistd::dup2(fd, stream)?;
				unistd::close(fd)?;
			}
		}
		Ok(())
	}
}

/// A command with everything `exec` needs already allocated, so the forked
/// child does nothing but system calls.
#[derive(Debug)]
pub struct Prepared {
	program: CString,
	argv: Vec<CString>,
	report: Vec<u8>,
}

impl Prepared {
	pub fn new(argv: &Argv) -> Result<Prepared> {
		let name = argv.program().ok_or(Error::EmptyCommand)?;
		let argv = argv.to_cstrings()?;
		Ok(Prepared {
			program: argv[0].clone(),
			argv: argv,
			report: format!("astsh: {}: ", name).into_bytes(),
		})
	}

	pub fn program(&self) -> &CStr {
		&self.program
	}

	fn exec(&self, plumbing: Plumbing) -> ! {
		// The shell ignores SIGPIPE; its programs should not.
		let _ = unsafe { signal::signal(Signal::SIGPIPE, SigHandler::SigDfl) };
		let errno = match plumbing.apply() {
			Err(errno) => errno,
			Ok(()) => match unistd::execvp(&self.program, &self.argv) {
				Err(errno) => errno,
				Ok(never) => match never {},
			},
		};
		let stderr = io::stderr();
		let _ = unistd::write(&stderr, &self.report);
		let _ = unistd::write(&stderr, errno.desc().as_bytes());
		let _ = unistd::write(&stderr, b"\n");
		let status = if errno == Errno::ENOENT { EXIT_NOT_FOUND } else { EXIT_CANNOT_EXEC };
		unsafe { libc::_exit(status) }
	}
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Process {
	pub pid: Pid,
	pub status: Option<ExitStatus>,
}

/// The children spawned for one input line.
///
/// Dropping a job reaps any child that was not waited on yet, so an early
/// return never leaves a zombie behind.
#[derive(Debug)]
pub struct Job {
	pub processes: Vec<Process>,
}

impl Job {
	/// Blocks until every process has terminated and returns the status of
	/// the last one.
	pub fn wait(&mut self) -> Result<ExitStatus> {
		let mut last = ExitStatus::Exited(0);
		for pr in self.processes.iter_mut() {
			let status = match pr.status {
				Some(status) => status,
				None => {
					let status = wait_terminated(pr.pid)?;
					pr.status = Some(status);
					status
				},
			};
			last = status;
		}
		Ok(last)
	}
}

impl Drop for Job {
	fn drop(&mut self) {
		for pr in self.processes.iter_mut().filter(|pr| pr.status.is_none()) {
			match wait_terminated(pr.pid) {
				Ok(status) => pr.status = Some(status),
				Err(e) => warn!(%e, "could not reap child"),
			}
		}
	}
}

fn wait_terminated(pid: Pid) -> Result<ExitStatus> {
	loop {
		match waitpid(pid, None) {
			Ok(status) => {
				if let Some(exit_status) = status.exit_status() {
					trace!(%pid, ?exit_status, "reaped");
					return Ok(exit_status);
				}
			},
			Err(Errno::EINTR) => (),
			Err(errno) => return Err(Error::Wait { pid: pid, source: errno }),
		}
	}
}

pub type ForkFn = unsafe fn() -> nix::Result<ForkResult>;

#[derive(Debug)]
pub struct JobBuilder {
	imp: Job,
	fork: ForkFn,
}

impl JobBuilder {
	pub fn new(size_hint: usize) -> JobBuilder {
		JobBuilder::with_fork(size_hint, unistd::fork)
	}

	/// Like `new`, but children are created through `fork`.
	pub fn with_fork(size_hint: usize, fork: ForkFn) -> JobBuilder {
		JobBuilder {
			imp: Job { processes: Vec::with_capacity(size_hint) },
			fork: fork,
		}
	}

	/// Forks a child that applies `plumbing` and execs `prepared`.
	pub fn push_fork(&mut self, prepared: &Prepared, plumbing: Plumbing) -> Result<Pid> {
		// Children write straight to fd 1; anything we buffered goes first.
		let _ = io::stdout().flush();
		let _ = io::stderr().flush();

		// The child only makes async-signal-safe calls before exec or _exit.
		match unsafe { (self.fork)() } {
			Ok(ForkResult::Parent { child }) => {
				debug!(pid = %child, program = ?prepared.program(), ?plumbing, "spawned");
				self.imp.processes.push(Process { pid: child, status: None });
				Ok(child)
			},
			Ok(ForkResult::Child) => prepared.exec(plumbing),
			Err(errno) => {
				warn!(%errno, program = ?prepared.program(), "fork failed");
				Err(Error::ProcessSpawn(errno))
			},
		}
	}

	pub fn build(self) -> Job {
		self.imp
	}
}
