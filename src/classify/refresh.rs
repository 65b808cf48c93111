//! Range dataset download and periodic refresh.

use super::classifier::OriginClassifier;
use super::table::{OrganizationTable, TableError};
use crate::config::TableSource;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Fetches and parses a complete dataset from `source`.
///
/// Parsing runs on the blocking pool; the caller's snapshot is untouched
/// until the returned table is handed to `OriginClassifier::replace`.
pub async fn load_table(
    source: &TableSource,
    client: &reqwest::Client,
) -> Result<OrganizationTable, TableError> {
    let bytes = match source {
        TableSource::File(path) => tokio::fs::read(path).await?,
        TableSource::Url(url) => {
            let response = client
                .get(url)
                .send()
                .await
                .map_err(|e| TableError::Fetch(e.to_string()))?;

            if !response.status().is_success() {
                return Err(TableError::Status(response.status().as_u16()));
            }

            response
                .bytes()
                .await
                .map_err(|e| TableError::Fetch(e.to_string()))?
                .to_vec()
        }
    };

    tokio::task::spawn_blocking(move || OrganizationTable::from_bytes(&bytes))
        .await
        .map_err(|e| TableError::Task(e.to_string()))?
}

/// Background task replacing the classifier snapshot on a fixed interval.
pub struct TableRefresher {
    source: TableSource,
    client: reqwest::Client,
    classifier: Arc<OriginClassifier>,
    period: Duration,
}

impl TableRefresher {
    pub fn new(
        source: TableSource,
        client: reqwest::Client,
        classifier: Arc<OriginClassifier>,
        period: Duration,
    ) -> Self {
        Self {
            source,
            client,
            classifier,
            period,
        }
    }

    /// Loads one dataset and swaps it in. On error the previous snapshot stays.
    pub async fn refresh_once(&self) -> Result<usize, TableError> {
        let started = Instant::now();
        let table = load_table(&self.source, &self.client).await?;
        let ranges = table.len();
        let skipped = table.skipped();

        self.classifier.replace(table);

        log::info!(
            "🗺️  Range table refreshed: {} ranges ({} skipped) in {}ms",
            ranges,
            skipped,
            started.elapsed().as_millis()
        );
        Ok(ranges)
    }

    /// Runs until cancelled. The startup load is done by the caller, so the
    /// first refresh happens one full period after start.
    pub async fn run(self, cancel: CancellationToken) {
        log::info!("⏰ Starting range table refresher (interval: {}s)", self.period.as_secs());

        let mut timer = interval_at(tokio::time::Instant::now() + self.period, self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = self.refresh_once() => {
                            if let Err(e) = result {
                                log::error!("❌ Failed to refresh range table, keeping previous snapshot: {}", e);
                            }
                        }
                    }
                }
            }
        }

        log::info!("✅ Range table refresher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_dataset(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn source_for(file: &tempfile::NamedTempFile) -> TableSource {
        TableSource::File(file.path().to_string_lossy().into_owned())
    }

    #[tokio::test]
    async fn test_load_table_from_file() {
        let file = write_dataset("8.8.8.0\t8.8.8.255\t15169\tUS\tGOOGLE\n");

        let table = load_table(&source_for(&file), &reqwest::Client::new()).await.unwrap();

        assert_eq!(table.asn_of("8.8.8.8".parse().unwrap()), Some(15169));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let good = write_dataset("8.8.8.0\t8.8.8.255\t15169\tUS\tGOOGLE\n");
        let classifier = Arc::new(OriginClassifier::new(
            load_table(&source_for(&good), &reqwest::Client::new()).await.unwrap(),
        ));

        let refresher = TableRefresher::new(
            TableSource::File("/nonexistent/editwatch/ip2asn.tsv".to_string()),
            reqwest::Client::new(),
            Arc::clone(&classifier),
            Duration::from_secs(60),
        );

        assert!(matches!(refresher.refresh_once().await, Err(TableError::Io(_))));
        assert_eq!(classifier.classify("8.8.8.8".parse().unwrap()), Some("Google"));
    }

    #[tokio::test]
    async fn test_refresh_replaces_snapshot() {
        let initial = write_dataset("8.8.8.0\t8.8.8.255\t15169\tUS\tGOOGLE\n");
        let updated = write_dataset("8.8.8.0\t8.8.8.255\t8075\tUS\tMICROSOFT\n");
        let classifier = Arc::new(OriginClassifier::new(
            load_table(&source_for(&initial), &reqwest::Client::new()).await.unwrap(),
        ));

        let refresher = TableRefresher::new(
            source_for(&updated),
            reqwest::Client::new(),
            Arc::clone(&classifier),
            Duration::from_secs(60),
        );

        assert_eq!(refresher.refresh_once().await.unwrap(), 1);
        assert_eq!(classifier.classify("8.8.8.8".parse().unwrap()), Some("Microsoft"));
    }

    #[tokio::test]
    async fn test_run_exits_on_cancel() {
        let file = write_dataset("8.8.8.0\t8.8.8.255\t15169\tUS\tGOOGLE\n");
        let classifier = Arc::new(OriginClassifier::new(
            load_table(&source_for(&file), &reqwest::Client::new()).await.unwrap(),
        ));
        let refresher = TableRefresher::new(
            source_for(&file),
            reqwest::Client::new(),
            classifier,
            Duration::from_secs(3600),
        );
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(refresher.run(cancel.clone()));
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("refresher did not stop")
            .unwrap();
    }
}
