//! # blocktree CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Open (or create) an index with the default 128-byte blocks
//! blocktree data.index
//!
//! # Choose a block size for a fresh index
//! blocktree --block-size 4096 data.index
//! ```
//!
//! The block size only matters for a fresh index; an existing boot file wins.

use std::env;
use std::path::PathBuf;

use blocktree::cli::Repl;
use blocktree::config::DEFAULT_BLOCK_SIZE;
use blocktree::BPlusTree;
use eyre::{bail, Result, WrapErr};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let mut block_size = DEFAULT_BLOCK_SIZE;
    let mut index_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            "--version" | "-v" => {
                println!("blocktree {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--block-size" | "-b" => {
                i += 1;
                let value = match args.get(i) {
                    Some(value) => value,
                    None => bail!("--block-size needs a value"),
                };
                block_size = value
                    .parse()
                    .wrap_err_with(|| format!("invalid block size {:?}", value))?;
            }
            arg if arg.starts_with('-') => {
                bail!("unknown option: {}", arg);
            }
            path => {
                if index_path.is_some() {
                    bail!("multiple index paths specified");
                }
                index_path = Some(PathBuf::from(path));
            }
        }
        i += 1;
    }

    let index_path = match index_path {
        Some(p) => p,
        None => {
            print_usage();
            return Ok(());
        }
    };

    let tree = BPlusTree::open(&index_path, block_size)
        .wrap_err_with(|| format!("failed to open index at {:?}", index_path))?;

    Repl::new(tree)?.run()
}

fn print_usage() {
    println!("blocktree - disk-resident B+ tree index");
    println!();
    println!("USAGE:");
    println!("    blocktree [OPTIONS] <INDEX_PATH>");
    println!();
    println!("ARGS:");
    println!("    <INDEX_PATH>         Path to the index file (boot file sits next to it)");
    println!();
    println!("OPTIONS:");
    println!("    -b, --block-size N   Block size in bytes for a fresh index (default {})", DEFAULT_BLOCK_SIZE);
    println!("    -h, --help           Print help information");
    println!("    -v, --version        Print version information");
}
