mod builtin;
mod error;
mod eval;
mod global;
mod job;
mod parser;
mod repl;
mod types;

use std::io::{self, IsTerminal};
use std::process;

use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_LEVEL: &str = "warn";

fn init_logging() {
	let env_filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));
	let _ = tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(io::stderr)
		.with_ansi(io::stderr().is_terminal())
		.try_init();
}

fn main() {
	init_logging();
	let mut state = global::State::new(global::Config::from_env());
	let code = match repl::run(&mut state) {
		Ok(()) => 0,
		Err(e) => {
			eprintln!("astsh: {}", e);
			1
		},
	};
	process::exit(code);
}
