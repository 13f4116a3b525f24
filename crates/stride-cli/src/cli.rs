use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "stride")]
#[command(about = "Track activities offline and sync them when a connection is available")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Treat the network as unavailable; sync commands report offline
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a finished activity
    #[command(alias = "add")]
    Record(RecordArgs),
    /// List recent activities
    List {
        /// Number of activities to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Only show activities with this sync status (pending, synced, conflict)
        #[arg(long)]
        status: Option<String>,
        /// Only show activities of this kind (run, walk, hike, cycle)
        #[arg(long)]
        kind: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one activity
    Show {
        /// Activity ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing activity
    Edit(EditArgs),
    /// Delete an activity
    #[command(alias = "rm")]
    Delete {
        /// Activity ID or unique ID prefix
        id: String,
    },
    /// List changes waiting to be pushed
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List conflicts resolved in favour of the server
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push local changes, then pull changes from the server
    Sync {
        /// Output the cycle summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace all local data with the server's copy
    ForceSync {
        /// Confirm that unsynced local changes will be lost
        #[arg(long)]
        yes: bool,
    },
    /// Keep syncing on a timer until interrupted
    Watch {
        /// Minutes between cycles; persisted as the auto-sync interval
        #[arg(long, value_name = "MINUTES")]
        interval: Option<u32>,
    },
    /// Show or change the persisted auto-sync setting
    AutoSync {
        #[arg(value_enum)]
        mode: AutoSyncMode,
        /// Minutes between cycles when enabling
        #[arg(long, value_name = "MINUTES")]
        interval: Option<u32>,
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

#[derive(Args, Debug, Clone, Default)]
pub struct RecordArgs {
    /// Activity kind (run, walk, hike, cycle)
    pub kind: String,
    /// Distance in kilometres
    #[arg(long)]
    pub km: f64,
    /// Duration as H:MM:SS, MM:SS, 1h20m, 45m or plain minutes
    #[arg(short, long)]
    pub duration: String,
    /// Start time (RFC 3339 or "YYYY-MM-DD HH:MM" UTC); defaults to ending now
    #[arg(long, value_name = "TIME")]
    pub started_at: Option<String>,
    /// Free-form notes; #tags are extracted
    #[arg(short, long)]
    pub notes: Option<String>,
    /// Extra tag (repeatable)
    #[arg(short, long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct EditArgs {
    /// Activity ID or unique ID prefix
    pub id: String,
    /// New activity kind
    #[arg(long)]
    pub kind: Option<String>,
    /// New distance in kilometres
    #[arg(long)]
    pub km: Option<f64>,
    /// New duration; the end time moves with it
    #[arg(short, long)]
    pub duration: Option<String>,
    /// Replace the notes
    #[arg(short, long, conflicts_with = "clear_notes")]
    pub notes: Option<String>,
    /// Remove the notes
    #[arg(long)]
    pub clear_notes: bool,
    /// Replace the tags (repeatable)
    #[arg(short, long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum AutoSyncMode {
    On,
    Off,
    Status,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
