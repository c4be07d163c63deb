use anyhow::Context;
use vst_db::service::{ItemService, PostItem};
use vst_db::updates::item::ItemUpdateBuilder;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::ItemCommands;
use crate::output::output;

/// Handle `vst item`.
pub async fn handle(
    action: ItemCommands,
    service: &ItemService,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match action {
        ItemCommands::Post {
            lot,
            index,
            contents,
            mode,
        } => {
            let form = PostItem {
                lot,
                index,
                contents,
            };
            let item = service
                .post(form, mode.into())
                .await
                .context("failed to post item")?;
            output(&item, flags.format)
        }
        ItemCommands::Get { id, kind } => {
            let item = service
                .get(&kind, id)
                .await
                .with_context(|| format!("failed to get {kind}:{id}"))?;
            output(&item, flags.format)
        }
        ItemCommands::Update {
            id,
            kind,
            contents,
            crypt_key,
            encrypted_contents,
        } => {
            let mut builder = ItemUpdateBuilder::new();
            if !contents.is_empty() {
                builder = builder.contents(contents);
            }
            if let Some(crypt_key) = crypt_key {
                builder = builder.crypt_key(crypt_key);
            }
            if let Some(encrypted) = encrypted_contents {
                builder = builder.encrypted_contents(encrypted);
            }
            let item = service
                .update(&kind, id, &builder.build())
                .await
                .with_context(|| format!("failed to update {kind}:{id}"))?;
            output(&item, flags.format)
        }
        ItemCommands::AllocateId {
            lot,
            index,
            contents,
        } => {
            let form = PostItem {
                lot,
                index,
                contents,
            };
            let item = service
                .allocate_and_put(form)
                .await
                .context("failed to allocate and save item")?;
            output(&item, flags.format)
        }
    }
}
