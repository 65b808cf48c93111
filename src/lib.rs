//! editwatch: anonymous edits from large network operators, debounced per article.
//!
//! Data flow:
//!
//! ```text
//! EventSource (SSE) -> StreamConsumer -> EventFilter -> OriginClassifier
//!     -> mpsc(1) -> Dispatcher -> AggregationStore -> Publisher
//! ```

pub mod aggregation;
pub mod classify;
pub mod config;
pub mod publish;
pub mod stream;

pub use config::RuntimeConfig;
