use crate::stream::event::RawChangeRecord;
use serde::Serialize;
use std::net::IpAddr;

/// A record that passed filtering and was attributed to a tracked organization.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedEdit {
    pub address: IpAddr,
    pub organization: &'static str,
    pub article_key: String,
    pub old_revision: u64,
    pub new_revision: u64,
    pub record: RawChangeRecord,
}

impl ClassifiedEdit {
    /// Returns `None` for an empty organization label.
    pub fn new(address: IpAddr, organization: &'static str, record: RawChangeRecord) -> Option<Self> {
        if organization.is_empty() {
            return None;
        }
        Some(Self {
            address,
            organization,
            article_key: record.article_key().to_string(),
            old_revision: record.revision.old,
            new_revision: record.revision.new,
            record,
        })
    }
}

/// Open burst for one article.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingEdit {
    pub article_key: String,
    pub origin: IpAddr,
    pub organization: &'static str,
    /// Old revision of the first edit in the burst.
    pub old_revision: u64,
    /// Newest revision seen in the burst.
    pub new_revision: u64,
    /// Unix timestamp of the latest edit.
    pub last_activity: i64,
    pub edit_count: u32,
    pub title: String,
    pub domain: String,
}

impl PendingEdit {
    pub fn open(edit: ClassifiedEdit, now: i64) -> Self {
        Self {
            article_key: edit.article_key,
            origin: edit.address,
            organization: edit.organization,
            old_revision: edit.old_revision,
            new_revision: edit.new_revision,
            last_activity: now,
            edit_count: 1,
            title: edit.record.title,
            domain: edit.record.meta.domain,
        }
    }

    /// Folds a same-origin edit into the burst.
    ///
    /// The old revision stays pinned to the burst's first edit. The new
    /// revision only moves forward, so a record replayed after a reconnect
    /// cannot shrink the range.
    pub fn extend(&mut self, edit: &ClassifiedEdit, now: i64) {
        self.new_revision = self.new_revision.max(edit.new_revision);
        self.last_activity = now;
        self.edit_count = self.edit_count.saturating_add(1);
    }

    pub fn idle_for(&self, now: i64) -> i64 {
        now - self.last_activity
    }
}
