use std::sync::Arc;

use vst_db::service::ItemService;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::Commands;
use crate::commands;

/// Dispatch a parsed command to the corresponding handler module.
pub async fn dispatch(
    command: Commands,
    service: &Arc<ItemService>,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match command {
        Commands::Item { action } => commands::item::handle(action, service, flags).await,
        Commands::Stress(args) => commands::stress::handle(&args, service, flags).await,
    }
}
