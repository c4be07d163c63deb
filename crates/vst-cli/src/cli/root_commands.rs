use clap::{Args, Subcommand, ValueEnum};
use vst_db::service::ClientMode;

use crate::cli::subcommands::ItemCommands;

/// Top-level command tree.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Item records.
    Item {
        #[command(subcommand)]
        action: ItemCommands,
    },
    /// Fire concurrent writes through one client-acquisition mode.
    Stress(StressArgs),
}

/// How a write acquires its store client.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ModeArg {
    /// Open and close a client around each call.
    PerCall,
    /// Reuse the cached client for the primary project.
    Shared,
    /// Reuse the cached client for the secondary project.
    SharedOther,
    /// Open a fresh client in every retry attempt.
    PerAttempt,
}

impl From<ModeArg> for ClientMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::PerCall => Self::PerCall,
            ModeArg::Shared => Self::Shared,
            ModeArg::SharedOther => Self::SharedOtherProject,
            ModeArg::PerAttempt => Self::PerAttempt,
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct StressArgs {
    /// Number of concurrent writers.
    #[arg(long, default_value_t = 50)]
    pub concurrency: usize,

    #[arg(long, value_enum, default_value = "shared")]
    pub mode: ModeArg,

    /// Lot written on every item; the writer index goes into `index`.
    #[arg(long, default_value = "stress")]
    pub lot: String,
}
