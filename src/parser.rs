use tracing::trace;

use crate::builtin::{self, Builtin};
use crate::error::{Error, Result};
use crate::global::Config;
use crate::types::*;

const PIPE: char = '|';

struct Parser<'a> {
	line: &'a str,
	i: usize,
}

impl<'a> Parser<'a> {
	fn proceed_while<F>(&mut self, f: F) where F: Fn(u8) -> bool {
		while let Some(c) = self.line.as_bytes().get(self.i) {
			if !f(*c) { break; }
			self.i += 1;
		}
	}

	fn is_separator(c: u8) -> bool {
		c == b' '
	}

	fn is_letter(c: u8) -> bool {
		!Parser::is_separator(c)
	}

	fn skip_separators(&mut self) {
		self.proceed_while(Parser::is_separator);
	}

	// Stops only on b' ', so the slice always ends on a char boundary.
	fn read_word(&mut self) -> &'a str {
		let orig = self.i;
		self.proceed_while(Parser::is_letter);
		&self.line[orig .. self.i]
	}

	fn parse_argv(&mut self, max_args: usize) -> Result<Argv<'a>> {
		let mut words: Vec<&'a str> = vec![];
		loop {
			self.skip_separators();
			let word = self.read_word();
			if word.is_empty() {
				break;
			}
			if words.len() == max_args {
				return Err(Error::ArgumentOverflow { limit: max_args });
			}
			words.push(word);
		}
		Ok(Argv::new(words))
	}
}

/// Splits a segment on spaces. Runs of spaces never produce empty words.
pub fn tokenize(segment: &str, max_args: usize) -> Result<Argv<'_>> {
	let mut parser = Parser { line: segment, i: 0 };
	parser.parse_argv(max_args)
}

/// Cuts the line at its first `|`. Anything after a second `|` stays in the
/// second segment; `parse` rejects it.
pub fn split_pipe(line: &str) -> (&str, Option<&str>) {
	match line.split_once(PIPE) {
		Some((head, tail)) => (head, Some(tail)),
		None => (line, None),
	}
}

fn command(segment: &str, max_args: usize) -> Result<Argv<'_>> {
	let argv = tokenize(segment, max_args)?;
	if argv.is_empty() {
		return Err(Error::EmptyCommand);
	}
	Ok(argv)
}

pub fn parse<'a>(line: &'a str, config: &Config) -> Result<Pipeline<'a>> {
	if line.chars().count() > config.max_line_len {
		return Err(Error::LineTooLong { limit: config.max_line_len });
	}
	let (head, tail) = split_pipe(line);
	match tail {
		None => Ok(Pipeline::Single(command(head, config.max_args)?)),
		Some(tail) if tail.contains(PIPE) => Err(Error::TooManyPipes),
		Some(tail) => {
			let producer = command(head, config.max_args)?;
			let consumer = command(tail, config.max_args)?;
			Ok(Pipeline::TwoStage(producer, consumer))
		},
	}
}

/// Decides whether a line is a builtin, a simple command or a pipeline.
///
/// A builtin is recognised by the first word of the first segment; a second
/// segment after `cd` is parsed but otherwise ignored.
pub fn classify<'a>(line: &'a str, config: &Config) -> Result<Action<'a>> {
	let pipeline = parse(line, config)?;
	let action = match pipeline.first().program().and_then(builtin::match_builtin) {
		Some(Builtin::ChangeDirectory) => Action::ChangeDirectory(pipeline.first().get(1)),
		None => match pipeline {
			Pipeline::Single(argv) => Action::RunSingle(argv),
			Pipeline::TwoStage(producer, consumer) => Action::RunPipeline(producer, consumer),
		},
	};
	trace!(?action, "classified line");
	Ok(action)
}
