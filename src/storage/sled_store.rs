use sled::Batch;
use tracing::trace;

use super::LocalStore;
use crate::constants::REPLICA_TREE;
use crate::record::WriteBatch;
use crate::Result;

/// sled-backed replica store
///
/// Records and index entries live in one tree so a single `apply_batch`
/// covers both.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledStore {
    pub fn new(db: sled::Db) -> Result<Self> {
        let tree = db.open_tree(REPLICA_TREE)?;
        Ok(Self { db, tree })
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

impl LocalStore for SledStore {
    fn batch_write(
        &self,
        batch: WriteBatch,
    ) -> Result<()> {
        trace!("batch_write len = {:?}", batch.len());

        let mut sled_batch = Batch::default();
        for (key, value) in batch {
            sled_batch.insert(key, value);
        }
        self.tree.apply_batch(sled_batch)?;
        Ok(())
    }

    fn get(
        &self,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        Ok(self.tree.get(key)?.map(|v| v.to_vec()))
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
