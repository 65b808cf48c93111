//! Transport for the edit-event stream.

use super::consumer::StreamError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use std::pin::Pin;
use std::time::Duration;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// Opens subscriptions to the event stream.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Subscribes, resuming after `resume_token` when given.
    ///
    /// The returned stream yields raw body bytes. It ends with `None` or
    /// `Err(StreamError::Terminated)` when the server closes the connection
    /// normally.
    async fn subscribe(&self, resume_token: Option<&str>) -> Result<ByteStream, StreamError>;
}

/// Server-sent-events subscription over HTTP.
pub struct HttpEventSource {
    client: reqwest::Client,
    url: String,
}

impl HttpEventSource {
    /// Builds a dedicated client: no overall request timeout, since a
    /// subscription is expected to stay open for many minutes.
    pub fn new(url: &str, user_agent: &str) -> Result<Self, StreamError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

/// True when the error chain reports an orderly close (HTTP/2 `NO_ERROR`).
pub fn is_benign_termination(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(e) = source {
        let text = format!("{} {:?}", e, e);
        if text.contains("NO_ERROR") || text.contains("not a result of an error") {
            return true;
        }
        source = e.source();
    }
    false
}

fn transport_error(err: reqwest::Error) -> StreamError {
    if is_benign_termination(&err) {
        StreamError::Terminated
    } else {
        StreamError::Transport(err.to_string())
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn subscribe(&self, resume_token: Option<&str>) -> Result<ByteStream, StreamError> {
        let mut request = self
            .client
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");

        if let Some(token) = resume_token {
            request = request.header("Last-Event-ID", token);
        }

        let response = request.send().await.map_err(|e| {
            if is_benign_termination(&e) {
                StreamError::Terminated
            } else {
                StreamError::Connect(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status(status.as_u16()));
        }

        Ok(Box::pin(response.bytes_stream().map(|chunk| chunk.map_err(transport_error))))
    }
}
