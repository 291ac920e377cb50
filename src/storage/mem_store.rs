use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::trace;

use super::LocalStore;
use crate::record::WriteBatch;
use crate::Result;

/// In-memory replica store
///
/// Test builds also keep every applied batch in order.
#[derive(Debug, Default)]
pub struct MemStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    #[cfg(test)]
    history: RwLock<Vec<WriteBatch>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applied batches, oldest first
    #[cfg(test)]
    pub fn history(&self) -> Vec<WriteBatch> {
        self.history.read().clone()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl LocalStore for MemStore {
    fn batch_write(
        &self,
        batch: WriteBatch,
    ) -> Result<()> {
        trace!("batch_write len = {:?}", batch.len());

        let mut data = self.data.write();
        for (key, value) in batch.iter() {
            data.insert(key.clone(), value.clone());
        }
        #[cfg(test)]
        self.history.write().push(batch);
        Ok(())
    }

    fn get(
        &self,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
