//! CLI command definitions

use clap::Args;

/// Launch pipelines and monitor them to completion
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Pipelines to launch, as `name` or `group/name`
    #[arg(conflicts_with_all = ["all", "group"])]
    pub pipelines: Vec<String>,

    /// Environment to run in (defaults to `ENV_NAME`, then the first configured one)
    #[arg(short, long)]
    pub env: Option<String>,

    /// Launch every pipeline of a group or suite
    #[arg(short, long)]
    pub group: Option<String>,

    /// Launch every configured pipeline
    #[arg(long)]
    pub all: bool,

    /// Run the browser without a window
    #[arg(long)]
    pub headless: bool,

    /// Don't save the batch report to history
    #[arg(long)]
    pub no_history: bool,

    /// Directory holding saved login sessions
    #[arg(long)]
    pub session_dir: Option<String>,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunCommand {
    /// Whether anything was asked for at all
    pub fn has_selection(&self) -> bool {
        self.all || self.group.is_some() || !self.pipelines.is_empty()
    }
}

/// Validate the configuration file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Output the normalized configuration as JSON
    #[arg(long)]
    pub json: bool,
}

/// List configured environments and pipelines
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Only list this environment
    #[arg(short, long)]
    pub env: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show past batch reports
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Environment to filter by
    #[arg(short, long)]
    pub env: Option<String>,

    /// Number of recent batches to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show per-run rows
    #[arg(long)]
    pub rows: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single batch by ID
    #[arg(long)]
    pub batch_id: Option<String>,
}
