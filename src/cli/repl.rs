//! # REPL
//!
//! The interactive loop for the `blocktree` binary: rustyline supplies line
//! editing and history, [`commands`](super::commands) supplies the grammar.
//! Recoverable conditions (duplicate key, absent key, malformed input) are
//! printed and the loop continues; storage errors abort the session with an
//! error. Ctrl-C clears the line, Ctrl-D quits like `q`.

use eyre::{Result, WrapErr};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::BPlusTree;

use super::commands::{CommandHandler, CommandOutcome};
use super::history::history_path;

const PROMPT: &str = "blocktree> ";

pub struct Repl {
    handler: CommandHandler,
    editor: DefaultEditor,
}

impl Repl {
    pub fn new(tree: BPlusTree) -> Result<Self> {
        let mut editor = DefaultEditor::new().wrap_err("failed to initialize line editor")?;

        if let Some(history_file) = history_path() {
            let _ = editor.load_history(&history_file);
        }

        Ok(Self {
            handler: CommandHandler::new(tree),
            editor,
        })
    }

    pub fn run(mut self) -> Result<()> {
        println!("blocktree {} — h for help, q to quit", env!("CARGO_PKG_VERSION"));

        loop {
            match self.editor.readline(PROMPT) {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(line.as_str());
                    let mut stdout = std::io::stdout().lock();
                    match self.handler.handle(&line, &mut stdout)? {
                        CommandOutcome::Continue => {}
                        CommandOutcome::Quit => break,
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                }
                Err(ReadlineError::Eof) => {
                    break;
                }
                Err(err) => {
                    eprintln!("error reading input: {}", err);
                    break;
                }
            }
        }

        if let Some(history_file) = history_path() {
            let _ = self.editor.save_history(&history_file);
        }

        self.handler.into_tree().close()
    }
}
