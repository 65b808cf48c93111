use super::publisher::PublishError;
use crate::aggregation::PendingEdit;

/// Titles longer than this are shortened.
pub const MAX_TITLE_CHARS: usize = 80;
const SHORTENED_TITLE_CHARS: usize = 76;

/// Rendered human-readable notification for one closed burst.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub text: String,
    pub diff_url: String,
}

pub fn is_wikidata(domain: &str) -> bool {
    domain.contains("wikidata.org")
}

pub fn site_tag(domain: &str) -> &'static str {
    if is_wikidata(domain) {
        "#wikidata"
    } else {
        "#wikipedia"
    }
}

/// Link to the combined diff of the burst's revision range.
pub fn diff_url(domain: &str, title: &str, old_revision: u64, new_revision: u64) -> String {
    format!(
        "https://{}/w/index.php?title={}&diff={}&oldid={}",
        domain,
        urlencoding::encode(title),
        new_revision,
        old_revision
    )
}

/// Cuts long titles to 76 characters followed by `..`.
pub fn shorten_title(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    let mut short: String = title.chars().take(SHORTENED_TITLE_CHARS).collect();
    short.push_str("..");
    short
}

impl Notification {
    /// Renders the notification for `burst` using `display_title` as the
    /// visible article name. The diff link always uses the raw title.
    pub fn build(burst: &PendingEdit, display_title: &str) -> Result<Self, PublishError> {
        reqwest::Url::parse(&burst.article_key)
            .map_err(|e| PublishError::InvalidUri(format!("{}: {}", burst.article_key, e)))?;

        let diff_url = diff_url(&burst.domain, &burst.title, burst.old_revision, burst.new_revision);

        if display_title.chars().count() > MAX_TITLE_CHARS {
            log::debug!("Shortening title: {}", display_title);
        }
        let title = shorten_title(display_title);

        let text = format!(
            "{} entry \"{}\" edited anonymously from #{} {}",
            site_tag(&burst.domain),
            title,
            burst.organization,
            diff_url
        );

        Ok(Self { text, diff_url })
    }

    /// JSON body for the notification endpoint.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({ "text": self.text })
    }
}
