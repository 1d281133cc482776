use std::env;

use tracing::warn;

use crate::job::ExitStatus;

pub const PROMPT: &str = ">>> ";
pub const DEFAULT_MAX_ARGS: usize = 100;
pub const DEFAULT_MAX_LINE_LEN: usize = 1000;
pub const DEFAULT_HISTORY_SIZE: usize = 1000;

const MAX_ARGS_KEY: &str = "ASTSH_MAX_ARGS";
const MAX_LINE_KEY: &str = "ASTSH_MAX_LINE";
const NO_BANNER_KEY: &str = "ASTSH_NO_BANNER";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
	/// Words allowed in one command before the line is rejected.
	pub max_args: usize,
	/// Characters allowed in one input line.
	pub max_line_len: usize,
	pub prompt: String,
	pub history_size: usize,
	pub banner: bool,
}

impl Default for Config {
	fn default() -> Config {
		Config {
			max_args: DEFAULT_MAX_ARGS,
			max_line_len: DEFAULT_MAX_LINE_LEN,
			prompt: PROMPT.to_string(),
			history_size: DEFAULT_HISTORY_SIZE,
			banner: true,
		}
	}
}

impl Config {
	pub fn from_env() -> Config {
		Config::from_lookup(|key| env::var(key).ok())
	}

	/// Builds a config from the defaults, overridden by whatever `lookup`
	/// returns for the `ASTSH_*` keys.
	pub fn from_lookup<F>(lookup: F) -> Config where F: Fn(&str) -> Option<String> {
		let mut config = Config::default();
		if let Some(n) = positive(MAX_ARGS_KEY, lookup(MAX_ARGS_KEY)) {
			config.max_args = n;
		}
		if let Some(n) = positive(MAX_LINE_KEY, lookup(MAX_LINE_KEY)) {
			config.max_line_len = n;
		}
		if lookup(NO_BANNER_KEY).map_or(false, |v| !v.is_empty() && v != "0") {
			config.banner = false;
		}
		config
	}
}

fn positive(key: &str, raw: Option<String>) -> Option<usize> {
	let raw = raw?;
	match raw.trim().parse::<usize>() {
		Ok(n) if n > 0 => Some(n),
		_ => {
			warn!(key, value = %raw, "ignoring invalid setting");
			None
		},
	}
}

pub struct State {
	pub config: Config,
	pub last_status: Option<ExitStatus>,
}

impl State {
	pub fn new(config: Config) -> State {
		State { config: config, last_status: None }
	}
}

/// Serialises tests that fork, open descriptors or change directory.
#[cfg(test)]
pub fn process_lock() -> std::sync::MutexGuard<'static, ()> {
	use std::sync::{Mutex, OnceLock};
	static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
	LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|e| e.into_inner())
}
