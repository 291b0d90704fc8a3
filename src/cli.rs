use std::path::PathBuf;

use clap::Parser;

/// Watch files and directories and print every change as it happens.
///
/// Each line names the affected path followed by what happened to it, e.g.
/// `/tmp/notes.txt: file modified`. Press Ctrl-C to stop.
#[derive(Parser, Debug)]
#[command(name = "fswatch", version, about, long_about = None)]
pub struct Cli {
    /// Files or directories to watch. Every path must exist.
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<PathBuf>,
}
