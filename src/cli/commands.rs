//! # Command Grammar and Execution
//!
//! The prompt accepts single-letter commands, most taking a key or an
//! inclusive key range:
//!
//! | Command   | Description                                  |
//! |-----------|----------------------------------------------|
//! | `i N`     | Insert key `N` (value = key)                 |
//! | `i A-B`   | Insert every key in `A..=B`                  |
//! | `r N`/`r A-B` | Remove a key or range                    |
//! | `s N`/`s A-B` | Search; prints `key value` or `-1`       |
//! | `d`       | Dump the tree structure                      |
//! | `t`       | Walk the leaf chain, printing every value    |
//! | `h`       | Show help                                    |
//! | `q`       | Quit                                         |
//!
//! Negative keys parse normally (`i -5`, `s -9--3`): a token is first tried
//! as a whole number, then split at an interior dash.
//!
//! Recoverable outcomes (duplicate insert, absent key) are printed and the
//! loop continues; storage errors propagate to the REPL and terminate it.

use std::io::Write;

use eyre::Result;

use crate::BPlusTree;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Insert(i64, i64),
    Remove(i64, i64),
    Search(i64, i64),
    Dump,
    Walk,
    Help,
    Quit,
    Empty,
}

/// Parses one input line. Errors are user-facing messages.
pub fn parse_line(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let verb = match words.next() {
        Some(verb) => verb,
        None => return Ok(Command::Empty),
    };
    let arg = words.next();
    if words.next().is_some() {
        return Err(format!("too many arguments in {:?}", line.trim()));
    }

    match (verb, arg) {
        ("i", Some(arg)) => parse_range(arg).map(|(a, b)| Command::Insert(a, b)),
        ("r", Some(arg)) => parse_range(arg).map(|(a, b)| Command::Remove(a, b)),
        ("s", Some(arg)) => parse_range(arg).map(|(a, b)| Command::Search(a, b)),
        ("i" | "r" | "s", None) => Err(format!("{} needs a key or range, e.g. {} 5 or {} 1-10", verb, verb, verb)),
        ("d", None) => Ok(Command::Dump),
        ("t", None) => Ok(Command::Walk),
        ("h", None) => Ok(Command::Help),
        ("q", None) => Ok(Command::Quit),
        ("d" | "t" | "h" | "q", Some(_)) => Err(format!("{} takes no argument", verb)),
        _ => Err(format!("unknown command {:?}, try h for help", verb)),
    }
}

/// Parses `N` or `A-B` (both bounds inclusive, negatives allowed).
fn parse_range(token: &str) -> Result<(i64, i64), String> {
    if let Ok(n) = token.parse::<i64>() {
        return Ok((n, n));
    }

    for (idx, ch) in token.char_indices().skip(1) {
        if ch != '-' {
            continue;
        }
        if let (Ok(a), Ok(b)) = (token[..idx].parse::<i64>(), token[idx + 1..].parse::<i64>()) {
            if a > b {
                return Err(format!("range {}-{} is backwards", a, b));
            }
            return Ok((a, b));
        }
    }

    Err(format!("cannot parse {:?} as a key or A-B range", token))
}

/// Executes parsed commands against one tree.
pub struct CommandHandler {
    tree: BPlusTree,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    Quit,
}

impl CommandHandler {
    pub fn new(tree: BPlusTree) -> Self {
        Self { tree }
    }

    pub fn into_tree(self) -> BPlusTree {
        self.tree
    }

    pub fn handle(&mut self, line: &str, out: &mut dyn Write) -> Result<CommandOutcome> {
        let command = match parse_line(line) {
            Ok(command) => command,
            Err(message) => {
                writeln!(out, "{}", message)?;
                return Ok(CommandOutcome::Continue);
            }
        };

        match command {
            Command::Insert(a, b) => {
                let mut inserted = 0u64;
                for key in a..=b {
                    if self.tree.insert(key, key)? {
                        inserted += 1;
                    } else {
                        writeln!(out, "key {} already exists", key)?;
                    }
                }
                writeln!(out, "inserted {} key(s)", inserted)?;
            }
            Command::Remove(a, b) => {
                let mut removed = 0u64;
                for key in a..=b {
                    if self.tree.remove(key)? {
                        removed += 1;
                    } else {
                        writeln!(out, "key {} not found", key)?;
                    }
                }
                writeln!(out, "removed {} key(s)", removed)?;
            }
            Command::Search(a, b) => {
                for key in a..=b {
                    match self.tree.search(key)? {
                        Some(value) => writeln!(out, "{} {}", key, value)?,
                        None => writeln!(out, "-1")?,
                    }
                }
            }
            Command::Dump => self.tree.dump(out)?,
            Command::Walk => self.tree.scan_leaves(out)?,
            Command::Help => write_help(out)?,
            Command::Quit => return Ok(CommandOutcome::Quit),
            Command::Empty => {}
        }

        Ok(CommandOutcome::Continue)
    }
}

pub fn write_help(out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "commands:")?;
    writeln!(out, "  i N | i A-B    insert a key or an inclusive range")?;
    writeln!(out, "  r N | r A-B    remove a key or an inclusive range")?;
    writeln!(out, "  s N | s A-B    search; prints 'key value' or -1")?;
    writeln!(out, "  d              dump the tree structure")?;
    writeln!(out, "  t              walk the leaves in key order")?;
    writeln!(out, "  h              this help")?;
    writeln!(out, "  q              quit")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_single_keys() {
        assert_eq!(parse_line("i 5"), Ok(Command::Insert(5, 5)));
        assert_eq!(parse_line("r 0"), Ok(Command::Remove(0, 0)));
        assert_eq!(parse_line("s -7"), Ok(Command::Search(-7, -7)));
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_line("i 1-10"), Ok(Command::Insert(1, 10)));
        assert_eq!(parse_line("s -9--3"), Ok(Command::Search(-9, -3)));
        assert_eq!(parse_line("r -2-4"), Ok(Command::Remove(-2, 4)));
    }

    #[test]
    fn parse_bare_commands() {
        assert_eq!(parse_line("d"), Ok(Command::Dump));
        assert_eq!(parse_line("t"), Ok(Command::Walk));
        assert_eq!(parse_line("h"), Ok(Command::Help));
        assert_eq!(parse_line("q"), Ok(Command::Quit));
        assert_eq!(parse_line("   "), Ok(Command::Empty));
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert!(parse_line("i").is_err());
        assert!(parse_line("i x").is_err());
        assert!(parse_line("i 5 6").is_err());
        assert!(parse_line("i 9-1").is_err());
        assert!(parse_line("z 3").is_err());
        assert!(parse_line("d 1").is_err());
    }

    #[test]
    fn handler_runs_a_session() {
        let dir = tempdir().unwrap();
        let tree = BPlusTree::open(dir.path().join("data.index"), 128).unwrap();
        let mut handler = CommandHandler::new(tree);

        let mut out = Vec::new();
        assert_eq!(
            handler.handle("i 1-10", &mut out).unwrap(),
            CommandOutcome::Continue
        );
        assert_eq!(String::from_utf8(out).unwrap(), "inserted 10 key(s)\n");

        let mut out = Vec::new();
        handler.handle("s 5", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "5 5\n");

        let mut out = Vec::new();
        handler.handle("s 11", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "-1\n");

        let mut out = Vec::new();
        handler.handle("t", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1 2 3 4 5 6 7 8 9 10\n");

        let mut out = Vec::new();
        handler.handle("r 4", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "removed 1 key(s)\n");

        let mut out = Vec::new();
        assert_eq!(handler.handle("q", &mut out).unwrap(), CommandOutcome::Quit);
    }

    #[test]
    fn handler_reports_duplicates_and_misses() {
        let dir = tempdir().unwrap();
        let tree = BPlusTree::open(dir.path().join("data.index"), 128).unwrap();
        let mut handler = CommandHandler::new(tree);

        let mut out = Vec::new();
        handler.handle("i 3", &mut out).unwrap();
        handler.handle("i 3", &mut out).unwrap();
        handler.handle("r 9", &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("key 3 already exists"));
        assert!(text.contains("key 9 not found"));
    }
}
