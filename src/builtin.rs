use std::env;

use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
	ChangeDirectory,
}

pub fn match_builtin(name: &str) -> Option<Builtin> {
	match name {
		"cd" => Some(Builtin::ChangeDirectory),
		_ => None,
	}
}

/// Changes the working directory of the shell, and so of every child spawned
/// after it. On failure the directory is left as it was.
pub fn builtin_cd(path: Option<&str>) -> Result<()> {
	let path = path.ok_or(Error::MissingDirectory)?;
	env::set_current_dir(path).map_err(|source| Error::DirectoryChange { path: path.to_owned(), source: source })?;
	debug!(path, "changed directory");
	Ok(())
}
