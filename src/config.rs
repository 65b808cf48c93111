use std::env;
use std::time::Duration;

pub const DEFAULT_STREAM_URL: &str = "https://stream.wikimedia.org/v2/stream/recentchange";
pub const DEFAULT_ASN_TABLE_URL: &str = "https://iptoasn.com/data/ip2asn-combined.tsv.gz";
pub const DEFAULT_PUBLISH_URL: &str = "https://api.twitter.com/2/tweets";
pub const DEFAULT_OAUTH_TOKEN_URL: &str = "https://api.twitter.com/2/oauth2/token";
pub const DEFAULT_OAUTH_AUTHORIZE_URL: &str = "https://twitter.com/i/oauth2/authorize";

/// Where the address range dataset comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum TableSource {
    Url(String),
    File(String),
}

/// OAuth2 client settings for the notification endpoint.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
    pub auth_code: Option<String>,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub stream_url: String,
    pub buffer_exponent: u32,
    pub buffer_exponent_max: u32,
    pub table_source: TableSource,
    pub refresh_interval: Duration,
    pub tick_interval: Duration,
    pub quiet_period_secs: i64,
    pub dry_run: bool,
    pub publish_url: String,
    /// `None` only in dry-run mode.
    pub oauth: Option<OAuthConfig>,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(format!("{} has unparsable value '{}'", name, raw))),
        _ => Ok(default),
    }
}

/// Accepts `true/false`, `1/0`, `yes/no` and `on/off`, in any case.
fn parse_flag(name: &str, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = non_empty_var(name) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(format!(
            "{} must be a boolean, got '{}'",
            name, raw
        ))),
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required_var(name: &str) -> Result<String, ConfigError> {
    non_empty_var(name).ok_or_else(|| ConfigError::MissingVariable(name.to_string()))
}

fn check_http_url(name: &str, url: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::InvalidValue(format!(
            "{} must start with http:// or https://",
            name
        )));
    }
    Ok(())
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let stream_url = non_empty_var("STREAM_URL").unwrap_or_else(|| DEFAULT_STREAM_URL.to_string());
        check_http_url("STREAM_URL", &stream_url)?;

        let buffer_exponent = parse_var("STREAM_BUFFER_EXPONENT", 18u32)?;
        let buffer_exponent_max = parse_var("STREAM_BUFFER_EXPONENT_MAX", 23u32)?;

        let table_source = match non_empty_var("ASN_TABLE_PATH") {
            Some(path) => TableSource::File(path),
            None => {
                let url = non_empty_var("ASN_TABLE_URL")
                    .unwrap_or_else(|| DEFAULT_ASN_TABLE_URL.to_string());
                check_http_url("ASN_TABLE_URL", &url)?;
                TableSource::Url(url)
            }
        };

        let refresh_secs = parse_var("ASN_REFRESH_INTERVAL_SECS", 26 * 60 * 60u64)?;
        let tick_secs = parse_var("TICK_INTERVAL_SECS", 60u64)?;
        let quiet_period_secs = parse_var("QUIET_PERIOD_SECS", 23 * 60i64)?;

        let dry_run = parse_flag("DRY_RUN", false)?;

        let publish_url = non_empty_var("PUBLISH_URL").unwrap_or_else(|| DEFAULT_PUBLISH_URL.to_string());
        check_http_url("PUBLISH_URL", &publish_url)?;

        let oauth = if dry_run {
            None
        } else {
            Some(OAuthConfig {
                client_id: required_var("OAUTH_CLIENT_ID")?,
                client_secret: required_var("OAUTH_CLIENT_SECRET")?,
                redirect_uri: required_var("OAUTH_REDIRECT_URI")?,
                authorize_url: non_empty_var("OAUTH_AUTHORIZE_URL")
                    .unwrap_or_else(|| DEFAULT_OAUTH_AUTHORIZE_URL.to_string()),
                token_url: non_empty_var("OAUTH_TOKEN_URL")
                    .unwrap_or_else(|| DEFAULT_OAUTH_TOKEN_URL.to_string()),
                auth_code: non_empty_var("OAUTH_AUTH_CODE"),
                access_token: non_empty_var("OAUTH_ACCESS_TOKEN"),
            })
        };

        let config = Self {
            stream_url,
            buffer_exponent,
            buffer_exponent_max,
            table_source,
            refresh_interval: Duration::from_secs(refresh_secs),
            tick_interval: Duration::from_secs(tick_secs),
            quiet_period_secs,
            dry_run,
            publish_url,
            oauth,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_exponent < 10 || self.buffer_exponent > self.buffer_exponent_max || self.buffer_exponent_max > 30 {
            return Err(ConfigError::InvalidValue(format!(
                "buffer exponents must satisfy 10 <= initial <= max <= 30, got {} and {}",
                self.buffer_exponent, self.buffer_exponent_max
            )));
        }

        if self.refresh_interval.is_zero() || self.tick_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "refresh and tick intervals must be positive".to_string(),
            ));
        }

        if self.quiet_period_secs <= 0 {
            return Err(ConfigError::InvalidValue(
                "QUIET_PERIOD_SECS must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
