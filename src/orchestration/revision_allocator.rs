//! Revision Allocator - next free revision index of a partition

use crate::core::error::Result;
use crate::core::types::{PackageRef, RevisionKey};
use crate::ledger::RevisionStore;

pub struct RevisionAllocator {
    store: RevisionStore,
}

impl RevisionAllocator {
    pub fn new(store: RevisionStore) -> Self {
        Self { store }
    }

    /// `max + 1` over existing `rev-N` directories and status entries, or 0
    ///
    /// Pure read; the caller owns the partition while it allocates.
    pub async fn next_index(&self, package: &PackageRef) -> Result<u64> {
        let taken = self.store.existing_indices(package).await?;
        Ok(taken.last().map(|max| max + 1).unwrap_or(0))
    }

    pub async fn allocate(&self, package: &PackageRef) -> Result<RevisionKey> {
        Ok(package.revision(self.next_index(package).await?))
    }
}
