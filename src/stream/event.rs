//! Wire types for the recent-changes stream.
//!
//! Only the subset of the `/mediawiki/recentchange/1.0.0` schema the
//! correlation rules need is decoded; unknown fields are ignored.

use serde::{Deserialize, Serialize};

/// Revision id carried by records that have no revision (log events, page creations).
pub const NO_REVISION: u64 = 0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub domain: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RevisionRange {
    #[serde(default)]
    pub old: u64,
    #[serde(default)]
    pub new: u64,
}

/// One edit notification as delivered on the stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawChangeRecord {
    #[serde(default)]
    pub meta: RecordMeta,
    #[serde(default)]
    pub title: String,
    /// Username, or the network address for anonymous edits.
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub revision: RevisionRange,
    /// Resume token of the frame this record arrived in. Not part of the JSON payload.
    #[serde(skip)]
    pub resume_token: Option<String>,
}

impl RawChangeRecord {
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    /// Stable key for correlating edits to the same article.
    pub fn article_key(&self) -> &str {
        &self.meta.uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_schema_subset() {
        let data = r#"{
            "$schema": "/mediawiki/recentchange/1.0.0",
            "meta": {"uri": "https://en.wikipedia.org/wiki/Foo", "domain": "en.wikipedia.org", "id": "x"},
            "type": "edit",
            "title": "Foo",
            "user": "192.0.2.7",
            "bot": false,
            "revision": {"old": 1, "new": 2}
        }"#;

        let record = RawChangeRecord::from_json(data).unwrap();

        assert_eq!(record.article_key(), "https://en.wikipedia.org/wiki/Foo");
        assert_eq!(record.meta.domain, "en.wikipedia.org");
        assert_eq!(record.user, "192.0.2.7");
        assert!(!record.bot);
        assert_eq!(record.revision, RevisionRange { old: 1, new: 2 });
        assert!(record.resume_token.is_none());
    }

    #[test]
    fn test_missing_revision_defaults_to_sentinel() {
        let data = r#"{"meta": {"uri": "u", "domain": "d"}, "title": "T", "user": "Alice", "type": "log"}"#;

        let record = RawChangeRecord::from_json(data).unwrap();

        assert_eq!(record.revision.old, NO_REVISION);
        assert_eq!(record.revision.new, NO_REVISION);
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(RawChangeRecord::from_json("{\"meta\": ").is_err());
    }
}
