//! # Command-Line Interface
//!
//! The interactive surface of the `blocktree` binary: a rustyline REPL over
//! the single-letter command grammar (`i`/`r`/`s` with keys or inclusive
//! ranges, `d` dump, `t` leaf walk, `h` help, `q` quit). The tree engine
//! reports recoverable outcomes as values; this layer turns them into text.

mod commands;
mod history;
mod repl;

pub use commands::{parse_line, write_help, Command, CommandHandler, CommandOutcome};
pub use history::history_path;
pub use repl::Repl;
