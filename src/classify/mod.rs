//! Origin classification: network address -> organization label.
//!
//! The address range dataset is loaded into an immutable `OrganizationTable`
//! snapshot. `OriginClassifier` hands every lookup its own `Arc` to the
//! current snapshot; `TableRefresher` builds a replacement off to the side and
//! swaps it in under a write lock held only for the pointer replacement.

pub mod classifier;
pub mod providers;
pub mod refresh;
pub mod table;

pub use classifier::OriginClassifier;
pub use refresh::{load_table, TableRefresher};
pub use table::{OrganizationTable, TableError};
