use super::auth::{refresh, AccessToken, AuthError};
use super::notification::Notification;
use super::title::{resolve_title, TitleResolver};
use crate::aggregation::PendingEdit;
use crate::config::OAuthConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug)]
pub enum PublishError {
    InvalidUri(String),
    BogusDiffUrl(String),
    Transport(String),
    Rejected { status: u16, body: String },
    Auth(AuthError),
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishError::InvalidUri(msg) => write!(f, "Invalid article URI: {}", msg),
            PublishError::BogusDiffUrl(msg) => write!(f, "Bogus diff URL: {}", msg),
            PublishError::Transport(msg) => write!(f, "Transport error: {}", msg),
            PublishError::Rejected { status, body } => {
                write!(f, "Notification rejected (HTTP {}): {}", status, body)
            }
            PublishError::Auth(e) => write!(f, "Authorization failed: {}", e),
        }
    }
}

impl std::error::Error for PublishError {}

/// Sink for closed bursts.
///
/// Publishing is best-effort: the caller logs an `Err` and moves on, the
/// burst is never retried.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, burst: &PendingEdit) -> Result<(), PublishError>;
}

/// Posts notifications to an HTTP endpoint with a bearer token.
///
/// With OAuth settings attached, the token is refreshed shortly before it
/// expires, and once more when the endpoint answers 401, after which that
/// single request is retried.
pub struct HttpPublisher {
    client: reqwest::Client,
    endpoint: String,
    token: Mutex<AccessToken>,
    oauth: Option<OAuthConfig>,
    titles: Arc<dyn TitleResolver>,
}

impl HttpPublisher {
    pub fn new(
        client: reqwest::Client,
        endpoint: &str,
        token: AccessToken,
        titles: Arc<dyn TitleResolver>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            token: Mutex::new(token),
            oauth: None,
            titles,
        }
    }

    /// Enables refreshing with the client credentials in `oauth`.
    pub fn with_refresh(mut self, oauth: OAuthConfig) -> Self {
        self.oauth = Some(oauth);
        self
    }

    fn can_refresh(&self, token: &AccessToken) -> bool {
        self.oauth.is_some() && token.can_refresh()
    }

    /// Current token, refreshed first when it is expiring or `force` is set.
    async fn token(&self, force: bool) -> Result<AccessToken, PublishError> {
        let mut token = self.token.lock().await;
        let now = chrono::Utc::now().timestamp();

        if !force && !token.is_expiring(now) {
            return Ok(token.clone());
        }
        let Some(oauth) = self.oauth.as_ref().filter(|_| token.can_refresh()) else {
            return Ok(token.clone());
        };

        let refreshed = refresh(&self.client, oauth, &token)
            .await
            .map_err(PublishError::Auth)?;
        *token = refreshed;
        Ok(token.clone())
    }

    /// Confirms the diff link resolves before it is published.
    async fn verify_diff_url(&self, url: &str) -> Result<(), PublishError> {
        self.client
            .get(url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| PublishError::BogusDiffUrl(format!("{}: {}", url, e)))
    }

    async fn post(&self, notification: &Notification, token: &AccessToken) -> Result<reqwest::Response, PublishError> {
        self.client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, token.authorization_header())
            .json(&notification.payload())
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, burst: &PendingEdit) -> Result<(), PublishError> {
        let title = resolve_title(self.titles.as_ref(), &burst.domain, &burst.title).await;
        let notification = Notification::build(burst, &title)?;

        self.verify_diff_url(&notification.diff_url).await?;

        let token = self.token(false).await?;
        let mut response = self.post(&notification, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED && self.can_refresh(&token) {
            log::warn!("⚠️  Notification endpoint rejected the access token, refreshing");
            let token = self.token(true).await?;
            response = self.post(&notification, &token).await?;
        }

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    log::warn!("Failed to read body from failed notification: {}", e);
                    String::new()
                }
            };
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        log::info!("📣 Published: {}", notification.text);
        Ok(())
    }
}

/// Dry-run publisher: renders and logs notifications without sending them.
pub struct LogPublisher {
    titles: Arc<dyn TitleResolver>,
}

impl LogPublisher {
    pub fn new(titles: Arc<dyn TitleResolver>) -> Self {
        Self { titles }
    }
}

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, burst: &PendingEdit) -> Result<(), PublishError> {
        let title = resolve_title(self.titles.as_ref(), &burst.domain, &burst.title).await;
        let notification = Notification::build(burst, &title)?;

        if let Ok(json) = serde_json::to_string(burst) {
            log::debug!("Closed burst: {}", json);
        }
        log::info!("📣 [dry-run] {}", notification.text);
        Ok(())
    }
}
