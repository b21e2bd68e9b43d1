use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "achieve", about = "Goal and habit tracker")]
pub struct Cli {
    /// Path to the SQLite database [default: ~/.achieve/achieve.db]
    #[arg(long, env = "ACHIEVE_DB", global = true)]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the database (idempotent)
    Init,

    /// Manage goals
    #[command(subcommand)]
    Goal(GoalCommand),

    /// Manage a goal's active tasks
    #[command(subcommand)]
    Task(TaskCommand),

    /// Complete a task for today, or undo today's completion
    Toggle {
        /// Goal id
        goal: i64,
        /// Task id
        task: i64,
    },

    /// Choose the goal shown by `today`
    Select {
        /// Goal id
        goal: Option<i64>,
        /// Clear the selection
        #[arg(long, conflicts_with = "goal")]
        clear: bool,
    },

    /// Show the next task of the selected goal
    Today {
        /// Show the next task even if something was completed today
        #[arg(long)]
        next: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List completed tasks grouped by day
    History {
        /// Goal id
        goal: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete one completed task record
    Forget {
        /// Goal id
        goal: i64,
        /// Task id
        task: i64,
        /// Completion timestamp (RFC 3339) as shown by `history --json`
        completed_at: String,
    },

    /// Export all data to a JSON file
    Export {
        /// Destination file [default: ./achieve-data-export-YYYY-MM-DD.json]
        path: Option<String>,
        /// Only print what would be exported
        #[arg(long)]
        stats: bool,
    },

    /// Import a JSON export, appending to existing data
    Import {
        /// File to import (.json, at most 10MB)
        path: String,
    },

    /// Print changes made by other processes as they happen
    Watch {
        /// Poll interval in seconds when no file event arrives
        #[arg(long, default_value = "5")]
        poll_interval: u64,
    },
}

#[derive(Subcommand)]
pub enum GoalCommand {
    /// Create a goal
    New {
        /// Goal title
        title: String,
        /// Goal description
        #[arg(short, long, default_value = "")]
        desc: String,
        /// Track as a daily habit with a streak
        #[arg(long)]
        habit: bool,
    },

    /// List goals
    List {
        /// Include archived goals
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show goal details
    Show {
        /// Goal id
        goal: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Edit a goal
    Edit {
        /// Goal id
        goal: i64,
        /// New title
        #[arg(short, long)]
        title: Option<String>,
        /// New description
        #[arg(short, long)]
        desc: Option<String>,
        /// Turn habit tracking on or off
        #[arg(long)]
        habit: Option<bool>,
    },

    /// Archive a goal
    Archive {
        /// Goal id
        goal: i64,
    },

    /// Restore an archived goal
    Unarchive {
        /// Goal id
        goal: i64,
    },

    /// Delete a goal with its tasks and history
    Rm {
        /// Goal id
        goal: i64,
    },

    /// Mark or unmark a day on a habit's streak calendar
    Mark {
        /// Goal id
        goal: i64,
        /// Day (YYYY-MM-DD) [default: today]
        day: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum TaskCommand {
    /// Add a task to the end of a goal's list
    Add {
        /// Goal id
        goal: i64,
        /// Task title
        title: String,
        /// Due day (YYYY-MM-DD) [default: now]
        #[arg(long)]
        due: Option<String>,
    },

    /// List a goal's active tasks in order
    List {
        /// Goal id
        goal: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove an active task without recording a completion
    Rm {
        /// Goal id
        goal: i64,
        /// Task id
        task: i64,
    },

    /// Move a task to a new position (1-based)
    Move {
        /// Goal id
        goal: i64,
        /// Task id
        task: i64,
        /// New position
        position: usize,
    },

    /// Rename a task
    Rename {
        /// Goal id
        goal: i64,
        /// Task id
        task: i64,
        /// New title
        title: String,
    },
}
