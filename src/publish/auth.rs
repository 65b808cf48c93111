//! One-shot OAuth2 authorization for the notification endpoint.
//!
//! The operator opens the authorization URL (logged at startup when no code
//! is configured), approves the app and passes the returned code back through
//! `OAUTH_AUTH_CODE`. The code is exchanged once for a bearer token. A
//! pre-issued token in `OAUTH_ACCESS_TOKEN` skips the exchange entirely.
//!
//! Exchanged tokens are short-lived. The `offline.access` scope yields a
//! refresh token, which `refresh` trades for a new access token.

use crate::config::OAuthConfig;
use serde::Deserialize;

pub const SCOPES: &str = "tweet.write offline.access tweet.read users.read";

/// PKCE verifier for the `plain` challenge method. It must match between the
/// logged authorization URL and a later exchange, so it is fixed.
const PKCE_VERIFIER: &str = "challenge";

/// Seconds before expiry at which a token is refreshed.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub token_type: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp after which the endpoint rejects the token.
    pub expires_at: Option<i64>,
}

impl AccessToken {
    /// A token of unknown lifetime that cannot be refreshed.
    pub fn bearer(access_token: &str) -> Self {
        Self {
            token_type: "bearer".to_string(),
            access_token: access_token.to_string(),
            refresh_token: None,
            expires_at: None,
        }
    }

    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// True once `now` is within `EXPIRY_MARGIN_SECS` of the expiry.
    pub fn is_expiring(&self, now: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at - EXPIRY_MARGIN_SECS,
            None => false,
        }
    }

    fn from_response(response: TokenResponse, now: i64) -> Self {
        Self {
            token_type: response.token_type,
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: response.expires_in.map(|secs| now + secs),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token_type: String,
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug)]
pub enum AuthError {
    MissingCode { authorize_url: String },
    InvalidUrl(String),
    Transport(String),
    Rejected { status: u16, body: String },
    NotRefreshable,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingCode { authorize_url } => write!(
                f,
                "No authorization code configured; visit {} and set OAUTH_AUTH_CODE",
                authorize_url
            ),
            AuthError::InvalidUrl(msg) => write!(f, "Invalid authorization URL: {}", msg),
            AuthError::Transport(msg) => write!(f, "Token exchange failed: {}", msg),
            AuthError::Rejected { status, body } => {
                write!(f, "Token exchange rejected (HTTP {}): {}", status, body)
            }
            AuthError::NotRefreshable => write!(f, "Access token carries no refresh token"),
        }
    }
}

impl std::error::Error for AuthError {}

/// URL the operator visits to grant access.
pub fn authorization_url(oauth: &OAuthConfig, state: &str) -> Result<String, AuthError> {
    let url = reqwest::Url::parse_with_params(
        &oauth.authorize_url,
        &[
            ("response_type", "code"),
            ("client_id", oauth.client_id.as_str()),
            ("redirect_uri", oauth.redirect_uri.as_str()),
            ("scope", SCOPES),
            ("state", state),
            ("code_challenge", PKCE_VERIFIER),
            ("code_challenge_method", "plain"),
        ],
    )
    .map_err(|e| AuthError::InvalidUrl(e.to_string()))?;
    Ok(url.to_string())
}

/// Obtains the bearer token used for publishing.
pub async fn authorize(client: &reqwest::Client, oauth: &OAuthConfig) -> Result<AccessToken, AuthError> {
    if let Some(token) = &oauth.access_token {
        log::info!("🔑 Using pre-issued access token");
        return Ok(AccessToken::bearer(token));
    }

    let Some(code) = &oauth.auth_code else {
        let state = chrono::Utc::now().timestamp().to_string();
        let authorize_url = authorization_url(oauth, &state)?;
        log::info!("🔑 Visit the URL for the auth dialog:\n{}", authorize_url);
        return Err(AuthError::MissingCode { authorize_url });
    };

    let token = request_token(exchange_request(client, oauth, code)).await?;
    log::info!(
        "✅ Authorized with notification endpoint (refreshable: {})",
        token.can_refresh()
    );
    Ok(token)
}

/// Trades the refresh token of `token` for a new access token.
///
/// The endpoint may omit a new refresh token, in which case the old one is
/// kept.
pub async fn refresh(
    client: &reqwest::Client,
    oauth: &OAuthConfig,
    token: &AccessToken,
) -> Result<AccessToken, AuthError> {
    let Some(refresh_token) = &token.refresh_token else {
        return Err(AuthError::NotRefreshable);
    };

    let mut refreshed = request_token(refresh_request(client, oauth, refresh_token)).await?;
    if refreshed.refresh_token.is_none() {
        refreshed.refresh_token = Some(refresh_token.clone());
    }

    log::info!("🔑 Access token refreshed");
    Ok(refreshed)
}

fn exchange_request(client: &reqwest::Client, oauth: &OAuthConfig, code: &str) -> reqwest::RequestBuilder {
    client
        .post(&oauth.token_url)
        .basic_auth(&oauth.client_id, Some(&oauth.client_secret))
        .form(&[
            ("code", code),
            ("grant_type", "authorization_code"),
            ("client_id", oauth.client_id.as_str()),
            ("redirect_uri", oauth.redirect_uri.as_str()),
            ("code_verifier", PKCE_VERIFIER),
        ])
}

fn refresh_request(
    client: &reqwest::Client,
    oauth: &OAuthConfig,
    refresh_token: &str,
) -> reqwest::RequestBuilder {
    client
        .post(&oauth.token_url)
        .basic_auth(&oauth.client_id, Some(&oauth.client_secret))
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", oauth.client_id.as_str()),
        ])
}

async fn request_token(request: reqwest::RequestBuilder) -> Result<AccessToken, AuthError> {
    let response = request
        .send()
        .await
        .map_err(|e| AuthError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| AuthError::Transport(e.to_string()))?;
    parse_token(&body, chrono::Utc::now().timestamp())
}

fn parse_token(body: &str, now: i64) -> Result<AccessToken, AuthError> {
    let response: TokenResponse =
        serde_json::from_str(body).map_err(|e| AuthError::Transport(format!("bad token response: {}", e)))?;
    Ok(AccessToken::from_response(response, now))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oauth() -> OAuthConfig {
        OAuthConfig {
            client_id: "client-1".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "https://example.org/callback".to_string(),
            authorize_url: "https://twitter.com/i/oauth2/authorize".to_string(),
            token_url: "https://api.twitter.com/2/oauth2/token".to_string(),
            auth_code: None,
            access_token: None,
        }
    }

    #[test]
    fn test_authorization_url_carries_pkce_and_redirect() {
        let url = authorization_url(&oauth(), "1700000000").unwrap();

        assert!(url.starts_with("https://twitter.com/i/oauth2/authorize?response_type=code"));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fexample.org%2Fcallback"));
        assert!(url.contains("code_challenge=challenge"));
        assert!(url.contains("code_challenge_method=plain"));
        assert!(url.contains("state=1700000000"));
    }

    fn form_body(request: &reqwest::Request) -> String {
        let bytes = request.body().and_then(|b| b.as_bytes()).unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_parses_refreshable_token_response() {
        let body = r#"{"token_type":"bearer","expires_in":7200,"access_token":"at-1","scope":"tweet.write offline.access","refresh_token":"rt-1"}"#;

        let token = parse_token(body, 1_700_000_000).unwrap();

        assert_eq!(token.authorization_header(), "bearer at-1");
        assert_eq!(token.refresh_token.as_deref(), Some("rt-1"));
        assert_eq!(token.expires_at, Some(1_700_007_200));
        assert!(token.can_refresh());
    }

    #[test]
    fn test_token_without_lifetime_never_expires() {
        let token = parse_token(r#"{"token_type":"bearer","access_token":"at-1"}"#, 0).unwrap();

        assert!(!token.can_refresh());
        assert!(!token.is_expiring(i64::MAX));
        assert!(!AccessToken::bearer("abc").is_expiring(i64::MAX));
    }

    #[test]
    fn test_is_expiring_within_margin() {
        let token = parse_token(
            r#"{"token_type":"bearer","access_token":"at-1","expires_in":7200}"#,
            1_000,
        )
        .unwrap();

        assert!(!token.is_expiring(1_000));
        assert!(!token.is_expiring(8_200 - EXPIRY_MARGIN_SECS - 1));
        assert!(token.is_expiring(8_200 - EXPIRY_MARGIN_SECS));
        assert!(token.is_expiring(9_000));
    }

    #[test]
    fn test_refresh_request_uses_refresh_grant() {
        let request = refresh_request(&reqwest::Client::new(), &oauth(), "rt-1")
            .build()
            .unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().as_str(), "https://api.twitter.com/2/oauth2/token");
        assert!(request
            .headers()
            .get(reqwest::header::AUTHORIZATION)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("Basic "));
        assert_eq!(
            form_body(&request),
            "grant_type=refresh_token&refresh_token=rt-1&client_id=client-1"
        );
    }

    #[test]
    fn test_exchange_request_carries_verifier() {
        let request = exchange_request(&reqwest::Client::new(), &oauth(), "code-9")
            .build()
            .unwrap();

        let body = form_body(&request);
        assert!(body.starts_with("code=code-9&grant_type=authorization_code"));
        assert!(body.contains("code_verifier=challenge"));
    }

    #[tokio::test]
    async fn test_refresh_requires_refresh_token() {
        let result = refresh(&reqwest::Client::new(), &oauth(), &AccessToken::bearer("abc")).await;

        assert!(matches!(result, Err(AuthError::NotRefreshable)));
    }

    #[tokio::test]
    async fn test_pre_issued_token_skips_exchange() {
        let mut config = oauth();
        config.access_token = Some("abc".to_string());

        let token = authorize(&reqwest::Client::new(), &config).await.unwrap();

        assert_eq!(token.authorization_header(), "bearer abc");
    }

    #[tokio::test]
    async fn test_missing_code_is_an_error() {
        let result = authorize(&reqwest::Client::new(), &oauth()).await;

        match result {
            Err(AuthError::MissingCode { authorize_url }) => {
                assert!(authorize_url.contains("client_id=client-1"));
            }
            other => panic!("expected MissingCode, got {:?}", other),
        }
    }
}
