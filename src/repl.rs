//! The interactive loop: greeting, directory display, prompt and history.
//!
//! Each line read here goes through `parser::classify` and `eval::eval`.
//! Errors from a line are printed and the loop moves on; only a failing line
//! reader ends it early.

use std::env;
use std::io::{self, IsTerminal, Write};

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, warn};

use crate::error::Result;
use crate::eval;
use crate::global::{Config, State};
use crate::parser;

const GREEN: &str = "\x1b[0;32m";
const BLUE: &str = "\x1b[0;34m";
const RESET: &str = "\x1b[0m";
const CLEAR: &str = "\x1b[H\x1b[J";
const BANNER_WIDTH: usize = 69;

/// A source of input lines.
pub trait LineReader {
	/// Reads one line without its newline. `Ok(None)` means end of input.
	fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;

	fn add_history(&mut self, line: &str);
}

/// Line editing and in-memory history on top of rustyline.
pub struct Editor {
	rl: DefaultEditor,
}

impl Editor {
	pub fn new(config: &Config) -> Result<Editor> {
		let rl_config = rustyline::Config::builder()
			.max_history_size(config.history_size)?
			.auto_add_history(false)
			.build();
		Ok(Editor { rl: DefaultEditor::with_config(rl_config)? })
	}
}

impl LineReader for Editor {
	fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
		match self.rl.readline(prompt) {
			Ok(line) => Ok(Some(line)),
			// Ctrl-C drops the line being edited.
			Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
			Err(ReadlineError::Eof) => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	fn add_history(&mut self, line: &str) {
		if let Err(e) = self.rl.add_history_entry(line) {
			warn!(%e, "could not add history entry");
		}
	}
}

fn paint(colour: bool, code: &str, text: &str) -> String {
	if colour {
		format!("{}{}{}", code, text, RESET)
	} else {
		text.to_string()
	}
}

fn banner(user: &str) -> String {
	let rule = format!("| {} |", "-".repeat(BANNER_WIDTH - 2));
	let blank = format!("|{}|", " ".repeat(BANNER_WIDTH));
	let line = |text: &str| format!("|{:^width$}|", text, width = BANNER_WIDTH);
	let title = format!("| {:_^width$}|", " Welcome to Astatine's Shell ", width = BANNER_WIDTH - 1);
	let mut s = String::new();
	for l in &[
		rule.clone(),
		blank.clone(),
		title,
		blank.clone(),
		line("Have a nice day at work!"),
		blank.clone(),
		line("**********************"),
		blank,
		rule,
	] {
		s.push_str(l);
		s.push('\n');
	}
	s.push_str(&format!("{:_^width$}\n", format!("  User is : @{}  ", user), width = BANNER_WIDTH + 2));
	s.push_str(&"*".repeat(BANNER_WIDTH + 2));
	s.push('\n');
	s
}

pub fn print_banner<W: Write>(out: &mut W, colour: bool) -> io::Result<()> {
	if colour {
		write!(out, "{}", CLEAR)?;
	}
	let user = env::var("USER").unwrap_or_else(|_| "unknown".to_string());
	writeln!(out)?;
	write!(out, "{}", banner(&user))?;
	writeln!(out)?;
	out.flush()
}

/// Prints the working directory before each prompt. A failure to read it is
/// reported and otherwise ignored.
pub fn show_current_dir<W: Write>(out: &mut W, colour: bool) {
	match env::current_dir() {
		Ok(dir) => {
			let _ = writeln!(
				out,
				"\n{} {}",
				paint(colour, GREEN, "Current Working Directory:"),
				paint(colour, BLUE, &dir.display().to_string()),
			);
			let _ = out.flush();
		},
		Err(e) => eprintln!("astsh: getcwd: {}", e),
	}
}

/// Classifies and runs one non-empty line, reporting any error.
pub fn run_line(state: &mut State, line: &str) {
	let r = parser::classify(line, &state.config).and_then(|action| eval::eval(state, &action));
	match r {
		Ok(status) => debug!(code = status.code(), success = status.success(), "line done"),
		Err(e) => eprintln!("astsh: {}", e),
	}
}

/// Runs until `input` reports end of input.
pub fn repl<R: LineReader, W: Write>(state: &mut State, input: &mut R, out: &mut W, colour: bool) -> Result<()> {
	let prompt = paint(colour, GREEN, &state.config.prompt);
	loop {
		show_current_dir(out, colour);
		// The prompt sits one blank line below the directory.
		let _ = writeln!(out);
		let _ = out.flush();
		let line = match input.read_line(&prompt)? {
			Some(line) => line,
			None => {
				debug!(last_status = ?state.last_status, "end of input");
				return Ok(());
			},
		};
		if line.trim().is_empty() {
			continue;
		}
		input.add_history(&line);
		run_line(state, &line);
	}
}

/// The interactive shell on the process's own terminal.
pub fn run(state: &mut State) -> Result<()> {
	let mut editor = Editor::new(&state.config)?;
	let mut stdout = io::stdout();
	let colour = stdout.is_terminal();
	if state.config.banner {
		if let Err(e) = print_banner(&mut stdout, colour) {
			warn!(%e, "could not print banner");
		}
	}
	repl(state, &mut editor, &mut stdout, colour)
}
