//! Eligibility rules applied to every decoded record before classification.

use super::event::{RawChangeRecord, NO_REVISION};

/// Title prefixes of pages that are not articles: discussion pages,
/// categories, files, templates and tutorial pages.
pub const NON_ARTICLE_PREFIXES: &[&str] = &[
    "User talk:",
    "Talk:",
    "Diskussion:",
    "Wikipedia:Tutorial",
    "Category:",
    "File:",
    "Template:",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Automated,
    NonArticle,
    MissingRevision,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Automated => write!(f, "automated edit"),
            Rejection::NonArticle => write!(f, "non-article namespace"),
            Rejection::MissingRevision => write!(f, "missing revision id"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventFilter {
    prefixes: Vec<String>,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::new(NON_ARTICLE_PREFIXES.iter().map(|p| p.to_string()).collect())
    }
}

impl EventFilter {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }

    pub fn check(&self, record: &RawChangeRecord) -> Result<(), Rejection> {
        if record.bot {
            return Err(Rejection::Automated);
        }
        if self.prefixes.iter().any(|p| record.title.starts_with(p.as_str())) {
            return Err(Rejection::NonArticle);
        }
        if record.revision.old == NO_REVISION || record.revision.new == NO_REVISION {
            return Err(Rejection::MissingRevision);
        }
        Ok(())
    }

    pub fn eligible(&self, record: &RawChangeRecord) -> bool {
        self.check(record).is_ok()
    }
}
