pub mod backoff;
pub mod consumer;
pub mod event;
pub mod filter;
pub mod source;
pub mod sse;

pub use consumer::{ConsumerStats, StreamConsumer, StreamError};
pub use event::RawChangeRecord;
pub use filter::EventFilter;
pub use source::{EventSource, HttpEventSource};
