use std::ffi::CString;

use crate::error::Result;

/// A program name followed by its arguments, borrowed from the input line.
///
/// Words are never empty. The end of the vector is the "no more arguments"
/// marker: `get` past the last word yields `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Argv<'a> {
	pub words: Vec<&'a str>,
}

impl<'a> Argv<'a> {
	pub fn new(words: Vec<&'a str>) -> Argv<'a> {
		debug_assert!(words.iter().all(|w| !w.is_empty()));
		Argv { words: words }
	}

	pub fn program(&self) -> Option<&'a str> {
		self.words.first().cloned()
	}

	pub fn get(&self, i: usize) -> Option<&'a str> {
		self.words.get(i).cloned()
	}

	pub fn is_empty(&self) -> bool {
		self.words.is_empty()
	}

	/// Owned, nul-terminated copies of every word, ready for `execvp`.
	pub fn to_cstrings(&self) -> Result<Vec<CString>> {
		let argv = self.words.iter().map(|&w| CString::new(w)).collect::<std::result::Result<Vec<CString>, _>>()?;
		Ok(argv)
	}
}

/// A tokenized input line: one command, or two joined by a pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pipeline<'a> {
	Single(Argv<'a>),
	TwoStage(Argv<'a>, Argv<'a>),
}

impl<'a> Pipeline<'a> {
	pub fn first(&self) -> &Argv<'a> {
		match *self {
			Pipeline::Single(ref argv) => argv,
			Pipeline::TwoStage(ref argv, _) => argv,
		}
	}
}

/// What the evaluator should do with a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action<'a> {
	ChangeDirectory(Option<&'a str>),
	RunSingle(Argv<'a>),
	RunPipeline(Argv<'a>, Argv<'a>),
}
