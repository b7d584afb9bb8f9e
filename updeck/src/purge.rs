//! Scheduled removal of generated presentations from the blob container.

use anyhow::Result;
use chrono::{DateTime, Days, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use tokio::select;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use common::Config;

use crate::storage::{BlobStore, StorageError};

/// Name prefix of the blobs the purge removes, appended to the configured path.
pub const PURGE_NAME_PREFIX: &str = "AzureUpdate-";

pub fn purge_prefix(config: &Config) -> String {
    format!("{}{}", config.purge_path(), PURGE_NAME_PREFIX)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub prefix: String,
    pub deleted: Vec<String>,
    /// (blob name, error)
    pub failed: Vec<(String, String)>,
}

impl PurgeReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Deletes every blob starting with `prefix`. A listing failure aborts; individual
/// deletion failures are recorded and the remaining blobs are still attempted.
pub async fn purge(store: &dyn BlobStore, prefix: &str) -> Result<PurgeReport, StorageError> {
    let names = store.list(prefix).await?;
    let mut report = PurgeReport {
        prefix: prefix.to_string(),
        ..PurgeReport::default()
    };

    for name in names {
        match store.delete(&name).await {
            Ok(()) => report.deleted.push(name),
            Err(e) => {
                warn!(blob = %name, error = %e, "failed to delete blob");
                report.failed.push((name, e.to_string()));
            }
        }
    }

    Ok(report)
}

/// Runs one purge and logs its outcome.
pub async fn run_once(store: &dyn BlobStore, prefix: &str) -> Result<PurgeReport, StorageError> {
    info!(prefix = %prefix, store = %store.describe(), "purge starting");

    match purge(store, prefix).await {
        Ok(report) if report.is_clean() => {
            info!(prefix = %prefix, deleted = report.deleted.len(), "purge finished");
            Ok(report)
        }
        Ok(report) => {
            error!(
                prefix = %prefix,
                deleted = report.deleted.len(),
                failed = report.failed.len(),
                "purge finished with failures"
            );
            Ok(report)
        }
        Err(e) => {
            error!(prefix = %prefix, error = %e, "purge failed");
            Err(e)
        }
    }
}

/// First of `times` (UTC, sorted) strictly after `now`, rolling over to tomorrow.
pub fn next_run_after(now: DateTime<Utc>, times: &[NaiveTime]) -> Option<DateTime<Utc>> {
    let today = now.date_naive();

    if let Some(t) = times.iter().find(|t| Utc.from_utc_datetime(&today.and_time(**t)) > now) {
        return Some(Utc.from_utc_datetime(&today.and_time(*t)));
    }

    let first = times.first()?;
    let tomorrow = today.checked_add_days(Days::new(1))?;
    Some(Utc.from_utc_datetime(&tomorrow.and_time(*first)))
}

/// Purge worker. Runs at every `[scheduler] times` entry until `shutdown` is notified.
pub async fn run_purger(
    store: Arc<dyn BlobStore>,
    config: Arc<Config>,
    shutdown: Arc<Notify>,
) -> Result<()> {
    let times = config.scheduler.parsed_times()?;
    let prefix = purge_prefix(&config);

    if times.is_empty() {
        info!("purger: no scheduler times configured, idling until shutdown");
        shutdown.notified().await;
        return Ok(());
    }

    info!(times = ?config.scheduler.times, prefix = %prefix, "purger: started");

    loop {
        let now = Utc::now();
        let Some(next) = next_run_after(now, &times) else {
            error!("purger: could not compute next run time");
            break;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next_run = %next, "purger: sleeping until next run");

        select! {
            _ = tokio::time::sleep(wait) => {
                // failures are already logged, the next tick tries again
                let _ = run_once(store.as_ref(), &prefix).await;
            }
            _ = shutdown.notified() => {
                info!("purger: shutdown requested, exiting loop");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
    }

    fn times(raw: &[&str]) -> Vec<NaiveTime> {
        raw.iter()
            .map(|t| NaiveTime::parse_from_str(t, "%H:%M").unwrap())
            .collect()
    }

    #[test]
    fn next_run_picks_later_time_today() {
        let t = times(&["02:00", "14:30"]);
        assert_eq!(next_run_after(at(1, 0, 0), &t), Some(at(2, 0, 0)));
        assert_eq!(next_run_after(at(2, 0, 0), &t), Some(at(14, 30, 0)));
    }

    #[test]
    fn next_run_rolls_over_to_tomorrow() {
        let t = times(&["02:00", "14:30"]);
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 2, 0, 0).unwrap();
        assert_eq!(next_run_after(at(14, 30, 0), &t), Some(expected));
        assert_eq!(next_run_after(at(23, 59, 59), &t), Some(expected));
    }

    #[test]
    fn next_run_without_times_is_none() {
        assert_eq!(next_run_after(at(0, 0, 0), &[]), None);
    }

    #[test]
    fn prefix_combines_path_and_name_prefix() {
        let mut config: Config = toml::from_str(
            r#"
            [feed]
            url = "https://example.com/feed"
            [storage]
            container = "decks"
            "#,
        )
        .unwrap();
        assert_eq!(purge_prefix(&config), "AzureUpdate-");

        config.apply_overrides_from(|k| (k == common::ENV_PURGE_PATH).then(|| "decks/old/".to_string()));
        assert_eq!(purge_prefix(&config), "decks/old/AzureUpdate-");
    }

    #[tokio::test]
    async fn purge_collects_partial_failures() {
        let store = MemoryBlobStore::new("mem://decks");
        for name in ["AzureUpdate-1", "AzureUpdate-2", "keep-me"] {
            store.put(name, vec![0], "x").await.unwrap();
        }
        store.fail_deletes_of("AzureUpdate-2").await;

        let report = purge(&store, "AzureUpdate-").await.unwrap();

        assert_eq!(report.deleted, vec!["AzureUpdate-1"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "AzureUpdate-2");
        assert!(!report.is_clean());
        assert_eq!(store.names().await, vec!["AzureUpdate-2", "keep-me"]);
    }

    #[tokio::test]
    async fn purger_stops_on_shutdown() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new("mem://decks"));
        let config: Config = toml::from_str(
            r#"
            [feed]
            url = "https://example.com/feed"
            [storage]
            container = "decks"
            [scheduler]
            times = ["03:00"]
            "#,
        )
        .unwrap();
        let shutdown = Arc::new(Notify::new());

        let handle = tokio::spawn(run_purger(store, Arc::new(config), shutdown.clone()));
        shutdown.notify_one();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("purger exits after shutdown")
            .expect("task not panicked");
        assert!(result.is_ok());
    }
}
