use super::providers::organization_for;
use super::table::OrganizationTable;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};

/// Maps network addresses to organization labels.
///
/// Readers take the read lock only long enough to clone the snapshot `Arc`;
/// the lookup itself runs on the clone. `replace` holds the write lock for a
/// single pointer assignment, so readers never wait on a dataset download or
/// parse.
#[derive(Debug)]
pub struct OriginClassifier {
    snapshot: RwLock<Arc<OrganizationTable>>,
}

impl OriginClassifier {
    pub fn new(table: OrganizationTable) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(table)),
        }
    }

    pub fn snapshot(&self) -> Arc<OrganizationTable> {
        let guard = self.snapshot.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Swaps in a freshly built table, returning the one it replaced.
    pub fn replace(&self, table: OrganizationTable) -> Arc<OrganizationTable> {
        let fresh = Arc::new(table);
        let mut guard = self.snapshot.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, fresh)
    }

    /// Organization label for `addr`, `None` if the address is not owned by a
    /// tracked provider.
    pub fn classify(&self, addr: IpAddr) -> Option<&'static str> {
        let asn = self.snapshot().asn_of(addr)?;
        organization_for(asn)
    }
}
