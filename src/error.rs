use std::{ffi, io};

use nix::errno::Errno;
use nix::unistd::Pid;
use rustyline::error::ReadlineError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while handling one input line.
///
/// All variants except `Readline` are local to the line that caused them:
/// the loop reports them and prompts again.
#[derive(Debug, Error)]
pub enum Error {
	#[error("too many arguments (limit is {limit})")]
	ArgumentOverflow { limit: usize },

	#[error("line too long (limit is {limit} characters)")]
	LineTooLong { limit: usize },

	#[error("only a single pipe is supported")]
	TooManyPipes,

	#[error("empty command")]
	EmptyCommand,

	#[error("cd: missing directory operand")]
	MissingDirectory,

	#[error("cd: {path}: {source}")]
	DirectoryChange { path: String, source: io::Error },

	#[error("could not create pipe: {0}")]
	PipeCreation(#[source] Errno),

	#[error("could not fork: {0}")]
	ProcessSpawn(#[source] Errno),

	#[error("could not wait for process {pid}: {source}")]
	Wait { pid: Pid, source: Errno },

	#[error("argument contains a nul byte: {0}")]
	NulByte(#[from] ffi::NulError),

	#[error(transparent)]
	Readline(#[from] ReadlineError),
}
