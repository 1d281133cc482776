use nix::fcntl::OFlag;
use nix::unistd;
use tracing::debug;

use crate::builtin;
use crate::error::{Error, Result};
use crate::global::State;
use crate::job::{ExitStatus, JobBuilder, Plumbing, Prepared};
use crate::types::{Action, Argv};

/// Runs one program on the shell's own standard streams and waits for it.
pub fn run_single(argv: &Argv) -> Result<ExitStatus> {
	let prepared = Prepared::new(argv)?;
	let mut job_builder = JobBuilder::new(1);
	job_builder.push_fork(&prepared, Plumbing::inherit())?;
	job_builder.build().wait()
}

/// Runs `producer | consumer` and waits for both. The returned status is the
/// consumer's.
///
/// If the consumer cannot be forked the producer is still waited on before
/// the spawn error is returned.
pub fn run_pipeline(producer: &Argv, consumer: &Argv) -> Result<ExitStatus> {
	run_pipeline_with(producer, consumer, JobBuilder::new(2))
}

fn run_pipeline_with(producer: &Argv, consumer: &Argv, mut job_builder: JobBuilder) -> Result<ExitStatus> {
	let first = Prepared::new(producer)?;
	let second = Prepared::new(consumer)?;
	let (read, write) = unistd::pipe2(OFlag::O_CLOEXEC).map_err(Error::PipeCreation)?;

	job_builder.push_fork(&first, Plumbing::stdout_to(&write, &read))?;
	let spawned = job_builder.push_fork(&second, Plumbing::stdin_from(&read, &write));

	// The consumer sees end of data only once every copy of the write end is
	// closed, ours included.
	drop(read);
	drop(write);

	let mut job = job_builder.build();
	let status = job.wait()?;
	spawned?;
	debug!(processes = ?job.processes, "pipeline finished");
	Ok(status)
}

pub fn eval(state: &mut State, action: &Action) -> Result<ExitStatus> {
	let r = match *action {
		Action::ChangeDirectory(path) => builtin::builtin_cd(path).map(|()| ExitStatus::Exited(0)),
		Action::RunSingle(ref argv) => run_single(argv),
		Action::RunPipeline(ref producer, ref consumer) => run_pipeline(producer, consumer),
	};
	match r {
		Ok(status) => {
			if status.is_exec_failure() {
				debug!(code = status.code(), "program could not be executed");
			}
			state.last_status = Some(status);
		},
		Err(_) => state.last_status = Some(ExitStatus::Exited(1)),
	}
	r
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::global::{process_lock, Config};
	use crate::job::EXIT_NOT_FOUND;
	use nix::errno::Errno;
	use nix::sys::resource::{getrlimit, setrlimit, Resource};
	use nix::sys::signal::Signal;
	use nix::sys::wait::{waitpid, WaitPidFlag};
	use nix::unistd::{ForkResult, Pid};
	use pretty_assertions::assert_eq;
	use std::sync::atomic::{AtomicUsize, Ordering};

	fn argv<'a>(words: &[&'a str]) -> Argv<'a> {
		Argv::new(words.to_vec())
	}

	fn assert_no_children() {
		assert_eq!(waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)), Err(Errno::ECHILD));
	}

	#[cfg(target_os = "linux")]
	fn open_fds() -> usize {
		std::fs::read_dir("/proc/self/fd").unwrap().count()
	}

	#[test]
	fn single_reports_exit_codes() {
		let _lock = process_lock();
		assert_eq!(run_single(&argv(&["true"])).unwrap(), ExitStatus::Exited(0));
		assert_eq!(run_single(&argv(&["false"])).unwrap(), ExitStatus::Exited(1));
		assert_eq!(run_single(&argv(&["sh", "-c", "exit 3"])).unwrap(), ExitStatus::Exited(3));
		assert_no_children();
	}

	#[test]
	fn single_reports_signals() {
		let _lock = process_lock();
		let status = run_single(&argv(&["sh", "-c", "kill -9 $$"])).unwrap();
		assert_eq!(status, ExitStatus::Signaled(Signal::SIGKILL));
		assert_eq!(status.code(), 137);
	}

	#[test]
	fn repeated_single_leaves_no_zombie() {
		let _lock = process_lock();
		for _ in 0..2 {
			assert!(run_single(&argv(&["pwd"])).unwrap().success());
			assert_no_children();
		}
	}

	#[test]
	fn single_with_missing_program() {
		let _lock = process_lock();
		let status = run_single(&argv(&["astsh-no-such-program"])).unwrap();
		assert_eq!(status, ExitStatus::Exited(EXIT_NOT_FOUND));
		assert_no_children();
	}

	#[test]
	fn pipeline_connects_output_to_input() {
		let _lock = process_lock();
		let hello = argv(&["echo", "hello"]);
		assert!(run_pipeline(&hello, &argv(&["grep", "-q", "hello"])).unwrap().success());
		assert_eq!(run_pipeline(&hello, &argv(&["grep", "-q", "bye"])).unwrap(), ExitStatus::Exited(1));
		assert!(run_pipeline(&hello, &argv(&["sh", "-c", "test $(wc -c) -eq 6"])).unwrap().success());
		assert_no_children();
	}

	#[test]
	fn pipeline_carries_more_than_a_pipe_buffer() {
		let _lock = process_lock();
		let status = run_pipeline(
			&argv(&["head", "-c", "200000", "/dev/zero"]),
			&argv(&["sh", "-c", "test $(wc -c) -eq 200000"]),
		).unwrap();
		assert!(status.success());
	}

	#[test]
	fn pipeline_producer_stops_when_consumer_exits() {
		let _lock = process_lock();
		assert!(run_pipeline(&argv(&["yes"]), &argv(&["true"])).unwrap().success());
		assert_no_children();
	}

	#[test]
	fn pipeline_with_missing_producer() {
		let _lock = process_lock();
		let status = run_pipeline(
			&argv(&["astsh-no-such-program"]),
			&argv(&["sh", "-c", "test $(wc -c) -eq 0"]),
		).unwrap();
		assert!(status.success());
		assert_no_children();
	}

	#[test]
	fn pipeline_with_missing_consumer() {
		let _lock = process_lock();
		let status = run_pipeline(&argv(&["echo", "hi"]), &argv(&["astsh-no-such-program"])).unwrap();
		assert_eq!(status, ExitStatus::Exited(EXIT_NOT_FOUND));
		assert_no_children();
	}

	#[cfg(target_os = "linux")]
	#[test]
	fn failed_pipelines_leak_no_descriptors() {
		let _lock = process_lock();
		let before = open_fds();
		let _ = run_pipeline(&argv(&["astsh-no-such-program"]), &argv(&["true"]));
		let _ = run_pipeline(&argv(&["true"]), &argv(&["astsh-no-such-program"]));
		let _ = run_single(&argv(&["astsh-no-such-program"]));
		assert_eq!(open_fds(), before);
	}

	// Restores the descriptor limit even if the test panics.
	struct FdLimit {
		soft: libc::rlim_t,
		hard: libc::rlim_t,
	}

	impl FdLimit {
		fn lower_to(soft: libc::rlim_t) -> FdLimit {
			let (orig_soft, hard) = getrlimit(Resource::RLIMIT_NOFILE).unwrap();
			setrlimit(Resource::RLIMIT_NOFILE, soft, hard).unwrap();
			FdLimit { soft: orig_soft, hard: hard }
		}
	}

	impl Drop for FdLimit {
		fn drop(&mut self) {
			let _ = setrlimit(Resource::RLIMIT_NOFILE, self.soft, self.hard);
		}
	}

	#[test]
	fn pipeline_without_free_descriptors() {
		let _lock = process_lock();
		let r = {
			let _limit = FdLimit::lower_to(0);
			run_pipeline(&argv(&["echo", "x"]), &argv(&["cat"]))
		};
		match r {
			Err(Error::PipeCreation(Errno::EMFILE)) => (),
			other => panic!("expected pipe creation error, got {:?}", other),
		}
		assert_no_children();
	}

	static FORKS: AtomicUsize = AtomicUsize::new(0);

	unsafe fn fork_once() -> nix::Result<ForkResult> {
		if FORKS.fetch_add(1, Ordering::SeqCst) == 0 {
			unistd::fork()
		} else {
			Err(Errno::EAGAIN)
		}
	}

	#[test]
	fn consumer_fork_failure_reaps_producer() {
		let _lock = process_lock();
		#[cfg(target_os = "linux")]
		let before = open_fds();
		FORKS.store(0, Ordering::SeqCst);

		let r = run_pipeline_with(
			&argv(&["echo", "hi"]),
			&argv(&["cat"]),
			JobBuilder::with_fork(2, fork_once),
		);
		match r {
			Err(Error::ProcessSpawn(Errno::EAGAIN)) => (),
			other => panic!("expected spawn error, got {:?}", other),
		}
		assert_eq!(FORKS.load(Ordering::SeqCst), 2);
		assert_no_children();
		#[cfg(target_os = "linux")]
		assert_eq!(open_fds(), before);
	}

	#[test]
	fn eval_records_last_status() {
		let _lock = process_lock();
		let mut state = State::new(Config::default());
		let status = eval(&mut state, &Action::RunSingle(argv(&["false"]))).unwrap();
		assert_eq!(status, ExitStatus::Exited(1));
		assert_eq!(state.last_status, Some(ExitStatus::Exited(1)));

		let status = eval(&mut state, &Action::RunPipeline(argv(&["echo", "x"]), argv(&["grep", "-q", "x"]))).unwrap();
		assert!(status.success());
		assert_eq!(state.last_status, Some(ExitStatus::Exited(0)));

		assert!(eval(&mut state, &Action::ChangeDirectory(None)).is_err());
		assert_eq!(state.last_status, Some(ExitStatus::Exited(1)));
	}
}
