use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `memoria` - long-lived user memory, reconciled one utterance at a time.
#[derive(Parser, Debug)]
#[command(name = "memoria")]
#[command(version = "0.1.0")]
#[command(about = "Reconcile, query and repair long-lived user memory.", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.memoria/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract facts from an utterance and commit add/update/delete decisions
    Reconcile {
        /// Memory owner (user id)
        #[arg(short, long)]
        owner: String,

        /// Provenance tag recorded on touched memories (default: utterance:<uuid>)
        #[arg(long)]
        source: Option<String>,

        /// Override the configured deadline in milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,

        /// The utterance to reconcile
        utterance: String,
    },

    /// Rank remembered facts by similarity to a text
    Query {
        #[arg(short, long)]
        owner: String,

        /// Maximum number of memories to return
        #[arg(short, long, default_value = "5")]
        limit: usize,

        text: String,
    },

    /// List live memories, newest first
    List {
        #[arg(short, long)]
        owner: String,
    },

    /// Delete one memory, or every memory of the owner with --all
    Forget {
        #[arg(short, long)]
        owner: String,

        /// Delete every live memory of the owner
        #[arg(long, conflicts_with = "id")]
        all: bool,

        /// Memory id to delete
        #[arg(required_unless_present = "all")]
        id: Option<String>,
    },

    /// Compare the vector index with live metadata
    Check {
        /// Owner to check (default: every known owner)
        #[arg(short, long)]
        owner: Option<String>,
    },

    /// Re-index missing vectors and drop orphaned ones
    Repair {
        /// Owner to repair (default: every known owner)
        #[arg(short, long)]
        owner: Option<String>,
    },
}
