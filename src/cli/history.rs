//! # History File Management
//!
//! Resolves the location of the REPL history file. Defaults to
//! `~/.blocktree_history`; the `BLOCKTREE_HISTORY` environment variable
//! overrides it, and an empty value disables persistence. rustyline handles
//! the actual file I/O.

use std::env;
use std::path::PathBuf;

const DEFAULT_HISTORY_FILE: &str = ".blocktree_history";
const HISTORY_ENV_VAR: &str = "BLOCKTREE_HISTORY";

pub fn history_path() -> Option<PathBuf> {
    if let Ok(custom_path) = env::var(HISTORY_ENV_VAR) {
        if custom_path.is_empty() {
            return None;
        }
        return Some(PathBuf::from(custom_path));
    }

    home_dir().map(|home| home.join(DEFAULT_HISTORY_FILE))
}

fn home_dir() -> Option<PathBuf> {
    env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_overrides_and_disables() {
        env::set_var(HISTORY_ENV_VAR, "/custom/history");
        assert_eq!(history_path(), Some(PathBuf::from("/custom/history")));

        env::set_var(HISTORY_ENV_VAR, "");
        assert_eq!(history_path(), None);

        env::remove_var(HISTORY_ENV_VAR);
    }
}
