//! Dispatcher - sole owner and mutator of the aggregation store
//!
//! Main loop:
//! 1. Receives classified edits from the stream consumer (capacity-1 channel)
//! 2. Folds each edit into the store, publishing bursts closed by an origin change
//! 3. On every tick, publishes and evicts bursts past the quiet period
//! 4. On cancellation or channel close, drops the still-open bursts
//!
//! Everything runs on one task, so the store needs no locking and edits for
//! one article are applied in stream order.

use super::store::{AggregationStore, ClosedBurst};
use super::types::ClassifiedEdit;
use crate::publish::Publisher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Counters reported when the dispatcher stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherReport {
    pub edits_received: u64,
    pub bursts_published: u64,
    pub publish_failures: u64,
    /// Bursts discarded at shutdown, including closed ones whose publish
    /// was interrupted.
    pub dropped: usize,
}

pub struct Dispatcher {
    store: AggregationStore,
    publisher: Arc<dyn Publisher>,
    tick_interval: Duration,
    report: DispatcherReport,
}

impl Dispatcher {
    pub fn new(store: AggregationStore, publisher: Arc<dyn Publisher>, tick_interval: Duration) -> Self {
        Self {
            store,
            publisher,
            tick_interval,
            report: DispatcherReport::default(),
        }
    }

    /// Runs until `cancel` fires or every sender is dropped.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<ClassifiedEdit>,
        cancel: CancellationToken,
    ) -> DispatcherReport {
        log::info!("🚀 Starting dispatcher");
        log::info!("   ├─ Tick interval: {}s", self.tick_interval.as_secs());
        log::info!("   └─ Quiet period: {}s", self.store.quiet_period_secs());

        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Closed bursts whose publish was cut short by shutdown.
        let mut unpublished = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("⚠️  Dispatcher received shutdown signal");
                    break;
                }

                maybe_edit = rx.recv() => {
                    let Some(edit) = maybe_edit else {
                        log::warn!("⚠️  Edit channel closed, stopping dispatcher");
                        break;
                    };
                    self.report.edits_received += 1;

                    if let Some(closed) = self.store.apply(edit) {
                        if !self.publish(closed, &cancel).await {
                            unpublished += 1;
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    let expired = self.store.expire();
                    if !expired.is_empty() {
                        log::debug!("Tick closed {} bursts ({} still open)", expired.len(), self.store.len());
                    }
                    let mut interrupted = false;
                    let mut remaining = expired.into_iter();
                    while let Some(closed) = remaining.next() {
                        if !self.publish(closed, &cancel).await {
                            unpublished += 1 + remaining.len();
                            interrupted = true;
                            break;
                        }
                    }
                    if interrupted {
                        break;
                    }
                }
            }
        }

        self.report.dropped = unpublished + self.store.discard_all();
        log::info!("Dropping {} changes", self.report.dropped);
        log::info!(
            "✅ Dispatcher stopped ({} edits, {} published, {} failed)",
            self.report.edits_received,
            self.report.bursts_published,
            self.report.publish_failures
        );
        self.report
    }

    /// Publishes one closed burst. Returns `false` if cancelled mid-publish.
    async fn publish(&mut self, closed: ClosedBurst, cancel: &CancellationToken) -> bool {
        log::info!(
            "🔔 Closing burst ({}): {} from {} ({}) r{}..r{}",
            closed.reason,
            closed.edit.title,
            closed.edit.origin,
            closed.edit.organization,
            closed.edit.old_revision,
            closed.edit.new_revision
        );

        tokio::select! {
            _ = cancel.cancelled() => false,
            result = self.publisher.publish(&closed.edit) => {
                match result {
                    Ok(()) => self.report.bursts_published += 1,
                    Err(e) => {
                        self.report.publish_failures += 1;
                        log::error!("❌ Failed to publish {}: {}", closed.edit.article_key, e);
                    }
                }
                true
            }
        }
    }
}
