//! Shared test utilities for vst-db unit tests.

#[cfg(test)]
pub(crate) mod helpers {
    use std::time::Duration;

    use tempfile::TempDir;
    use vst_config::StoreConfig;
    use vst_core::{Retry, RetryPolicy};

    use crate::StoreClient;

    /// A store config whose local databases live in a fresh temp dir.
    ///
    /// Tests use files rather than `:memory:` because every connection to an
    /// in-memory database sees a different database.
    pub fn temp_store_config() -> (TempDir, StoreConfig) {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            local_dir: dir.path().to_string_lossy().into_owned(),
            ..StoreConfig::default()
        };
        (dir, config)
    }

    /// Open a migrated local client for `project` in a temp dir.
    pub async fn local_client(project: &str) -> (TempDir, StoreClient) {
        let (dir, config) = temp_store_config();
        let client = StoreClient::open(&config, project).await.unwrap();
        (dir, client)
    }

    /// A retry executor with millisecond backoff and no jitter.
    pub fn fast_retry(max_attempts: u32) -> Retry {
        Retry::new(
            RetryPolicy::new(max_attempts)
                .with_base_delay(Duration::from_millis(1))
                .with_jitter_step(Duration::ZERO),
        )
    }
}
