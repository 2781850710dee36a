/// Available commands
use clap::Subcommand;

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
  /// Open a collection and load every page of it
  Open { collection: String },

  /// List the collection hierarchy
  #[command(alias = "ls")]
  Collections,

  /// Submit photos for batch annotation and follow the job until it finishes
  Process {
    #[arg(required = true)]
    photo_ids: Vec<String>,

    /// Collection to show, refreshed once the batch completes
    #[arg(short, long)]
    collection: Option<String>,
  },

  /// Annotate a single photo and wait for the result
  Annotate { photo_id: String },

  /// Show what the service is processing right now
  Status,

  /// Reconcile stored processing statuses with finished work
  Confirm,

  /// Drop cached data for one collection, or everything
  ClearCache { collection: Option<String> },
}

impl Command {
  /// Whether the command needs a provider to be selected
  pub fn needs_provider(&self) -> bool {
    matches!(self, Command::Process { .. } | Command::Annotate { .. })
  }
}
