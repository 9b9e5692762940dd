//! CLI command definitions and dispatch.
//!
//! Each subcommand opens the persisted queue, applies one operation through
//! the queue controller and prints the result:
//! - `queue`: mutations (play, add, next, remove, move, jump, clear, ...)
//! - `show`: printing the queue as text or JSON

mod queue;
mod show;

use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;

pub use queue::{
    cmd_add, cmd_back, cmd_clear, cmd_jump, cmd_move, cmd_next, cmd_play, cmd_remove,
    cmd_shuffle, cmd_skip,
};
pub use show::cmd_show;

/// Queue Minder CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Queue database path (defaults to the configured path)
    #[arg(long, global = true, env = "QUEUE_MINDER_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Print the queue
    Show {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace the queue and start playing
    Play {
        /// Track ids, in order
        #[arg(required = true)]
        ids: Vec<i64>,
        /// Index to start at
        #[arg(long, default_value_t = 0)]
        start: usize,
    },
    /// Append tracks to the end of the queue
    Add {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Insert tracks right after the current one
    #[command(group(ArgGroup::new("source").required(true).args(["ids", "from_queue"])))]
    Next {
        ids: Vec<i64>,
        /// Move the already queued entry at INDEX up instead
        #[arg(long, value_name = "INDEX")]
        from_queue: Option<usize>,
    },
    /// Remove the entry at an index
    Remove { index: usize },
    /// Move an entry from one index to another
    Move { from: usize, to: usize },
    /// Make the entry at an index current
    Jump { index: usize },
    /// Empty the queue
    Clear,
    /// Shuffle everything after the current entry
    Shuffle,
    /// Advance to the next entry
    Skip,
    /// Go back to the previous entry
    Back,
}

/// Run a CLI command if one was specified.
///
/// Returns `Ok(true)` if a command was executed, `Ok(false)` if none was
/// given (the caller prints help).
pub fn run_command(cli: &Cli) -> anyhow::Result<bool> {
    let Some(command) = &cli.command else {
        return Ok(false);
    };

    let rt = Runtime::new()?;
    let db = cli.db.as_deref();

    match command {
        Commands::Show { json } => cmd_show(&rt, db, *json)?,
        Commands::Play { ids, start } => cmd_play(&rt, db, ids, *start)?,
        Commands::Add { ids } => cmd_add(&rt, db, ids)?,
        Commands::Next { ids, from_queue } => cmd_next(&rt, db, ids, *from_queue)?,
        Commands::Remove { index } => cmd_remove(&rt, db, *index)?,
        Commands::Move { from, to } => cmd_move(&rt, db, *from, *to)?,
        Commands::Jump { index } => cmd_jump(&rt, db, *index)?,
        Commands::Clear => cmd_clear(&rt, db)?,
        Commands::Shuffle => cmd_shuffle(&rt, db)?,
        Commands::Skip => cmd_skip(&rt, db)?,
        Commands::Back => cmd_back(&rt, db)?,
    }
    Ok(true)
}
