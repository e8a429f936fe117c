use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use lure_core::ConflictResolution;

#[derive(Parser)]
#[command(name = "lure")]
#[command(about = "Save, queue and reconcile Lure campaigns from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Save a campaign JSON file
    Save {
        /// Campaign file
        file: PathBuf,
        /// Queue the save without contacting the server
        #[arg(long)]
        offline: bool,
        /// How to settle a revision conflict
        #[arg(long, value_enum, value_name = "RESOLUTION")]
        on_conflict: Option<ResolutionArg>,
    },
    /// Fetch the server copy of a campaign
    Pull {
        /// Campaign ID
        campaign_id: String,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Show the patch between two campaign files
    Diff {
        /// Campaign file before the edit
        old: PathBuf,
        /// Campaign file after the edit
        new: PathBuf,
    },
    /// Inspect and drain the offline save queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Inspect local drafts
    Draft {
        #[command(subcommand)]
        command: DraftCommands,
    },
    /// Manage named campaign backups
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
    /// List recent revision conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Settle the open conflict of a campaign
    Resolve {
        /// Campaign ID
        campaign_id: String,
        #[arg(value_enum)]
        resolution: ResolutionArg,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ResolutionArg {
    /// Drop local edits and adopt the server copy
    Reload,
    /// Write the local copy over the server revision
    Overwrite,
    /// Leave the conflict open
    Cancel,
}

impl From<ResolutionArg> for ConflictResolution {
    fn from(value: ResolutionArg) -> Self {
        match value {
            ResolutionArg::Reload => Self::ReloadDiscardLocal,
            ResolutionArg::Overwrite => Self::ForceOverwrite,
            ResolutionArg::Cancel => Self::Cancel,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// List pending saves
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List saves that ran out of retries
    Failed {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replay every pending save now
    Drain,
    /// Put a failed save back in the queue
    Retry {
        /// Queue entry ID
        id: String,
    },
    /// Drop a queued or failed save
    Discard {
        /// Queue entry ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum DraftCommands {
    /// Print the local draft of a campaign
    Show {
        /// Campaign ID
        campaign_id: String,
    },
    /// Delete the local draft of a campaign
    Clear {
        /// Campaign ID
        campaign_id: String,
    },
}

#[derive(Subcommand)]
pub enum BackupCommands {
    /// Store a named backup of a campaign file
    Create {
        /// Campaign file
        file: PathBuf,
        /// Backup name
        #[arg(long)]
        name: String,
    },
    /// List backups of a campaign
    List {
        /// Campaign ID
        campaign_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the campaign stored in a backup
    Restore {
        /// Backup ID
        id: String,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Delete a backup
    Delete {
        /// Backup ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Campaign API base URL
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Local database path for this profile
        #[arg(long, value_name = "PATH")]
        db_path: Option<PathBuf>,
        /// Do not make this profile the active one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved configuration
    Show,
}
