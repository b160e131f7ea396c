use super::coordinator::{Mutation, WriteCoordinator, WriteReceipt};
use super::types::{RecordFilter, RecordInput};

/// Best-effort batched CRUD.
///
/// Operations queue in memory until `commit`, which applies them
/// sequentially through the synchronous write path and stops at the first
/// error. This batches related writes behind one call site; it is not an
/// ACID transaction across backends.
pub struct Transaction<'a> {
    coordinator: &'a WriteCoordinator,
    operations: Vec<Mutation>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(coordinator: &'a WriteCoordinator) -> Self {
        Self {
            coordinator,
            operations: Vec::new(),
        }
    }

    /// Queue a save.
    pub fn save(&mut self, input: RecordInput) -> &mut Self {
        self.operations.push(Mutation::Save(input));
        self
    }

    /// Queue a delete.
    pub fn delete(&mut self, filter: RecordFilter) -> &mut Self {
        self.operations.push(Mutation::Delete(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Apply all queued operations in order. The first failure aborts the
    /// remainder and surfaces; operations already applied stay applied.
    pub async fn commit(self) -> anyhow::Result<Vec<WriteReceipt>> {
        let mut receipts = Vec::with_capacity(self.operations.len());
        for operation in &self.operations {
            receipts.push(self.coordinator.apply_now(operation).await?);
        }
        Ok(receipts)
    }

    /// Discard all queued operations without applying them.
    pub fn rollback(mut self) {
        self.operations.clear();
    }
}
