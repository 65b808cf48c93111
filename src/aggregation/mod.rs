//! Debounce engine: per-article bursts of classified edits.
//!
//! ## Architecture
//!
//! ```text
//! ClassifiedEdit (mpsc, capacity 1)      tick (interval)
//!          \                                /
//!           Dispatcher::run (single task, tokio::select!)
//!                         |
//!                AggregationStore (owned, no locks)
//!                         |
//!                 ClosedBurst -> Publisher
//! ```
//!
//! A burst closes when its article stays quiet past the threshold or when an
//! edit from a different origin address arrives for the same article.

pub mod dispatcher;
pub mod store;
pub mod types;

pub use dispatcher::{Dispatcher, DispatcherReport};
pub use store::{AggregationStore, ClosedBurst, ClosureReason};
pub use types::{ClassifiedEdit, PendingEdit};
