//! `vst stress`: many concurrent writers through one acquisition mode.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::task::JoinSet;
use vst_db::service::{ClientMode, ItemService, PostItem};

use crate::cli::GlobalFlags;
use crate::cli::root_commands::StressArgs;
use crate::output::output;

#[derive(Debug, Serialize)]
struct StressReport {
    mode: ClientMode,
    concurrency: usize,
    succeeded: usize,
    failed: usize,
    /// Clients held by the cache once every writer returned.
    cached_clients: usize,
    elapsed_ms: u128,
    errors: Vec<String>,
}

/// Handle `vst stress`.
pub async fn handle(
    args: &StressArgs,
    service: &Arc<ItemService>,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let mode = ClientMode::from(args.mode);
    // Resolve the target before spawning so a missing project fails once.
    service.project_for(mode)?;

    let started = Instant::now();
    let results = run_writers(service, mode, &args.lot, args.concurrency).await;

    let mut report = StressReport {
        mode,
        concurrency: args.concurrency,
        succeeded: 0,
        failed: 0,
        cached_clients: service.cache().len().await,
        elapsed_ms: started.elapsed().as_millis(),
        errors: Vec::new(),
    };
    for result in results {
        match result {
            Ok(()) => report.succeeded += 1,
            Err(error) => {
                report.failed += 1;
                report.errors.push(format!("{error:#}"));
            }
        }
    }

    tracing::debug!(
        %mode,
        succeeded = report.succeeded,
        failed = report.failed,
        "stress run finished"
    );
    output(&report, flags.format)
}

async fn run_writers(
    service: &Arc<ItemService>,
    mode: ClientMode,
    lot: &str,
    concurrency: usize,
) -> Vec<anyhow::Result<()>> {
    let mut writers = JoinSet::new();
    for index in 0..concurrency {
        let service = Arc::clone(service);
        let form = PostItem {
            lot: lot.to_string(),
            index: i64::try_from(index).unwrap_or(i64::MAX),
            contents: Vec::new(),
        };
        writers.spawn(async move {
            service.post(form, mode).await?;
            Ok::<(), anyhow::Error>(())
        });
    }

    let mut results = Vec::with_capacity(concurrency);
    while let Some(joined) = writers.join_next().await {
        results.push(joined.map_err(anyhow::Error::from).and_then(|r| r));
    }
    results
}
