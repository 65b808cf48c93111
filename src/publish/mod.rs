//! Notification publishing: text rendering, title enrichment, authorization
//! and the transport to the notification endpoint.

pub mod auth;
pub mod notification;
pub mod publisher;
pub mod title;

pub use auth::{authorize, AccessToken, AuthError};
pub use notification::Notification;
pub use publisher::{HttpPublisher, LogPublisher, PublishError, Publisher};
pub use title::{TitleResolver, WikidataTitles};

/// `User-Agent` sent with every outbound request.
pub const USER_AGENT: &str = concat!("editwatch/", env!("CARGO_PKG_VERSION"));
