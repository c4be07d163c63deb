use clap::Subcommand;
use vst_db::entities::kinds;

use crate::cli::root_commands::ModeArg;

/// Item record commands.
#[derive(Clone, Debug, Subcommand)]
pub enum ItemCommands {
    /// Save a new item.
    Post {
        #[arg(long)]
        lot: String,
        #[arg(long, default_value_t = 0)]
        index: i64,
        /// Repeat for each entry.
        #[arg(long = "content")]
        contents: Vec<String>,
        #[arg(long, value_enum, default_value = "shared")]
        mode: ModeArg,
    },
    /// Get an item by kind and id.
    Get {
        id: i64,
        #[arg(long, default_value = kinds::ONLY_ONE_CLIENT)]
        kind: String,
    },
    /// Read-modify-write an existing item.
    Update {
        id: i64,
        #[arg(long, default_value = kinds::ONLY_ONE_CLIENT)]
        kind: String,
        /// Replace the contents; repeat for each entry.
        #[arg(long = "content")]
        contents: Vec<String>,
        #[arg(long)]
        crypt_key: Option<String>,
        #[arg(long)]
        encrypted_contents: Option<String>,
    },
    /// Reserve an id, then save a new item under it.
    AllocateId {
        #[arg(long)]
        lot: String,
        #[arg(long, default_value_t = 0)]
        index: i64,
        #[arg(long = "content")]
        contents: Vec<String>,
    },
}
