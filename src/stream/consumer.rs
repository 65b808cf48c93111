//! Long-lived stream consumer.
//!
//! ## States
//!
//! ```text
//! Connecting --subscribed--> Streaming --disconnect--> Connecting
//! ```
//!
//! Disconnect handling:
//! - orderly close (`Terminated`): reconnect at once, logged at debug
//! - frame larger than the read buffer: double the capacity and reconnect at
//!   once with the same resume token; past the ceiling the consumer stops with
//!   `StreamError::BufferCeiling`, which the binary treats as fatal
//! - anything else: log, wait out the backoff, reconnect
//!
//! Every reconnect sends the id of the last decoded frame, so delivery is
//! at-least-once across reconnects. Cancellation is observed while
//! connecting, streaming, handing off and backing off.

use super::backoff::ReconnectBackoff;
use super::event::RawChangeRecord;
use super::filter::EventFilter;
use super::source::{ByteStream, EventSource};
use super::sse::{SseDecoder, SseError, SseFrame};
use crate::aggregation::ClassifiedEdit;
use crate::classify::OriginClassifier;
use futures::StreamExt;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamError {
    Connect(String),
    Transport(String),
    Status(u16),
    /// The server ended the subscription in an orderly way.
    Terminated,
    RecordTooLarge { limit: usize },
    /// Fatal: a record would need a buffer beyond the configured ceiling.
    BufferCeiling { exponent: u32, ceiling: u32 },
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamError::Connect(msg) => write!(f, "Connection error: {}", msg),
            StreamError::Transport(msg) => write!(f, "Transport error: {}", msg),
            StreamError::Status(code) => write!(f, "Subscription rejected with HTTP {}", code),
            StreamError::Terminated => write!(f, "Stream terminated by server"),
            StreamError::RecordTooLarge { limit } => {
                write!(f, "Record exceeds read buffer of {} bytes", limit)
            }
            StreamError::BufferCeiling { exponent, ceiling } => write!(
                f,
                "Read buffer would grow to 2^{} bytes, beyond the 2^{} ceiling",
                exponent, ceiling
            ),
        }
    }
}

impl std::error::Error for StreamError {}

/// Why a subscription stopped without an error.
enum Stop {
    Cancelled,
    HandoffClosed,
}

/// Counters kept across reconnects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub subscriptions: u64,
    pub frames: u64,
    pub malformed: u64,
    pub filtered: u64,
    pub unclassified: u64,
    pub handed_off: u64,
}

pub struct StreamConsumer {
    source: Arc<dyn EventSource>,
    filter: EventFilter,
    classifier: Arc<OriginClassifier>,
    tx: mpsc::Sender<ClassifiedEdit>,
    buffer_exponent: u32,
    max_buffer_exponent: u32,
    resume_token: Option<String>,
    backoff: ReconnectBackoff,
    stats: ConsumerStats,
}

impl StreamConsumer {
    pub fn new(
        source: Arc<dyn EventSource>,
        filter: EventFilter,
        classifier: Arc<OriginClassifier>,
        tx: mpsc::Sender<ClassifiedEdit>,
        buffer_exponent: u32,
        max_buffer_exponent: u32,
    ) -> Self {
        Self {
            source,
            filter,
            classifier,
            tx,
            buffer_exponent,
            max_buffer_exponent,
            resume_token: None,
            backoff: ReconnectBackoff::default(),
            stats: ConsumerStats::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: ReconnectBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn resume_token(&self) -> Option<&str> {
        self.resume_token.as_deref()
    }

    pub fn buffer_exponent(&self) -> u32 {
        self.buffer_exponent
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Consumes the stream until cancelled or the dispatcher goes away.
    ///
    /// Only `StreamError::BufferCeiling` is returned as an error; every other
    /// failure is retried.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), StreamError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let subscribed = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                result = self.source.subscribe(self.resume_token.as_deref()) => result,
            };

            let stream = match subscribed {
                Ok(stream) => stream,
                Err(StreamError::Terminated) => {
                    log::debug!("Stream closed during subscribe, reconnecting");
                    continue;
                }
                Err(e) => {
                    log::warn!("⚠️  Failed to subscribe: {}", e);
                    if !self.backoff.sleep(&cancel).await {
                        return Ok(());
                    }
                    continue;
                }
            };

            self.stats.subscriptions += 1;
            self.backoff.reset();
            log::info!(
                "✅ Subscribed to edit stream (buffer 2^{} bytes, resume: {})",
                self.buffer_exponent,
                if self.resume_token.is_some() { "yes" } else { "no" }
            );

            match self.pump(stream, &cancel).await {
                Ok(Stop::Cancelled) => return Ok(()),
                Ok(Stop::HandoffClosed) => {
                    log::warn!("⚠️  Dispatcher channel closed, stopping stream consumer");
                    return Ok(());
                }
                Err(StreamError::Terminated) => {
                    // The server closes every subscription periodically.
                    log::debug!("Stream terminated by server, resuming");
                }
                Err(StreamError::RecordTooLarge { limit }) => {
                    self.grow_buffer(limit)?;
                }
                Err(e) => {
                    log::warn!("⚠️  Stream disconnected: {}", e);
                    if !self.backoff.sleep(&cancel).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn grow_buffer(&mut self, limit: usize) -> Result<(), StreamError> {
        let next = self.buffer_exponent + 1;
        if next > self.max_buffer_exponent {
            log::error!(
                "❌ Record larger than {} bytes and buffer is at its 2^{} ceiling",
                limit,
                self.max_buffer_exponent
            );
            return Err(StreamError::BufferCeiling {
                exponent: next,
                ceiling: self.max_buffer_exponent,
            });
        }

        log::warn!(
            "⚠️  Record exceeds {} bytes, growing read buffer to 2^{}",
            limit,
            next
        );
        self.buffer_exponent = next;
        Ok(())
    }

    async fn pump(&mut self, mut stream: ByteStream, cancel: &CancellationToken) -> Result<Stop, StreamError> {
        let mut decoder = SseDecoder::new(1usize << self.buffer_exponent);

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Ok(Stop::Cancelled),
                chunk = stream.next() => chunk,
            };

            let bytes = match chunk {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => return Err(e),
                None => return Err(StreamError::Terminated),
            };
            decoder.push(&bytes);

            loop {
                let frame = match decoder.next_frame() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break,
                    Err(SseError::FrameTooLarge { limit }) => {
                        return Err(StreamError::RecordTooLarge { limit });
                    }
                    Err(SseError::InvalidUtf8) => {
                        self.stats.malformed += 1;
                        log::warn!("⚠️  Dropping frame with invalid UTF-8");
                        continue;
                    }
                };

                if let Some(stop) = self.handle_frame(frame, cancel).await {
                    return Ok(stop);
                }
            }
        }
    }

    async fn handle_frame(&mut self, frame: SseFrame, cancel: &CancellationToken) -> Option<Stop> {
        if frame.data.is_empty() {
            return None;
        }
        self.stats.frames += 1;
        if let Some(id) = frame.id {
            self.resume_token = Some(id);
        }

        let mut record = match RawChangeRecord::from_json(&frame.data) {
            Ok(record) => record,
            Err(e) => {
                self.stats.malformed += 1;
                let preview: String = frame.data.chars().take(200).collect();
                log::warn!("⚠️  Failed to unmarshal data: {} ({})", e, preview);
                return None;
            }
        };
        record.resume_token = self.resume_token.clone();

        let edit = self.classify(record)?;

        tokio::select! {
            _ = cancel.cancelled() => Some(Stop::Cancelled),
            sent = self.tx.send(edit) => match sent {
                Ok(()) => {
                    self.stats.handed_off += 1;
                    None
                }
                Err(_) => Some(Stop::HandoffClosed),
            },
        }
    }

    /// Filter, then attribute. `None` means the record is not handed off.
    fn classify(&mut self, record: RawChangeRecord) -> Option<ClassifiedEdit> {
        if let Err(reason) = self.filter.check(&record) {
            self.stats.filtered += 1;
            log::debug!("Filtered {} ({})", record.title, reason);
            return None;
        }

        // Registered users edit under a username.
        let Ok(address) = record.user.parse::<IpAddr>() else {
            self.stats.unclassified += 1;
            return None;
        };

        let Some(organization) = self.classifier.classify(address) else {
            self.stats.unclassified += 1;
            log::debug!("No organization for {} ({})", address, record.title);
            return None;
        };

        log::debug!(
            "Classified edit: {} on {} from {} ({})",
            record.title,
            record.meta.domain,
            address,
            organization
        );
        ClassifiedEdit::new(address, organization, record)
    }
}
