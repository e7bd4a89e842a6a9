//! Storage-manager operation surface over the key-value backend.
//!
//! Every operation is self-contained: resolve the namespace, open a store
//! handle with the operation's create policy, do the metadata and tuple
//! work, close the handle. No handle survives across calls and there is
//! no locking here; the host serializes access per relation fork. On
//! error paths the handle is released by drop.

use crate::codec;
use crate::error::{StorageError, StorageResult};
use crate::kv::KvStore;
use crate::meta;
use crate::page::{declared_page_size, BlockNumber, BLOCK_SIZE};
use crate::relpath::{self, ForkNumber, RelFileLocator};
use log::debug;
use std::path::{Path, PathBuf};

/// Default storage root when none is configured.
pub const DEFAULT_ROOT: &str = "/tmp/relkv";

/// Maps a relational engine's block operations onto per-namespace
/// key-value stores under a single root directory.
pub struct StorageManager {
    root: PathBuf,
}

impl StorageManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Does the relation fork exist?
    ///
    /// Probing never creates the namespace; an open failing with
    /// `NotFound` maps to `false`, every other failure propagates.
    pub fn exists(&self, rel: RelFileLocator, fork: ForkNumber) -> StorageResult<bool> {
        match self.open_store(rel, fork, false) {
            Ok(store) => {
                store.close()?;
                Ok(true)
            }
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create the relation fork's namespace with a block count of zero.
    ///
    /// Under redo an existing counter is preserved, so replaying the
    /// creation cannot shrink a relation that already grew.
    pub fn create(
        &self,
        rel: RelFileLocator,
        fork: ForkNumber,
        is_redo: bool,
    ) -> StorageResult<()> {
        debug!("create: {:?} {:?} (redo: {})", rel, fork, is_redo);
        let mut store = self.open_store(rel, fork, true)?;
        let already_initialized = if is_redo {
            match meta::read_block_count(&mut store) {
                Ok(_) => true,
                Err(StorageError::NotFound(_)) => false,
                Err(e) => return Err(e),
            }
        } else {
            false
        };
        if !already_initialized {
            meta::initialize(&mut store)?;
        }
        store.close()
    }

    /// Read the block at `block` into `out`.
    pub fn read(
        &self,
        rel: RelFileLocator,
        fork: ForkNumber,
        block: BlockNumber,
        out: &mut [u8; BLOCK_SIZE],
    ) -> StorageResult<()> {
        debug!("read: block {} of {:?} {:?}", block, rel, fork);
        let mut store = self.open_store(rel, fork, false)?;
        codec::decode_page(&mut store, block, out)?;
        store.close()
    }

    /// Write the supplied page image at `block`.
    ///
    /// `skip_sync` is accepted for interface compatibility and ignored;
    /// the backend syncs every put before returning. A placeholder image
    /// (declared size differing from the block size) routes to the
    /// extend path instead of being stored.
    pub fn write(
        &self,
        rel: RelFileLocator,
        fork: ForkNumber,
        block: BlockNumber,
        buffer: &[u8; BLOCK_SIZE],
        _skip_sync: bool,
    ) -> StorageResult<()> {
        debug!("write: block {} of {:?} {:?}", block, rel, fork);
        let mut store = self.open_store(rel, fork, true)?;
        codec::encode_page(&mut store, block, buffer)?;
        store.close()
    }

    /// Grow the relation by one block.
    ///
    /// This is the explicit extend entry point: the block counter is
    /// bumped unconditionally, and the supplied image is stored as well
    /// when it is a real data page rather than a zero-filled placeholder.
    pub fn extend(
        &self,
        rel: RelFileLocator,
        fork: ForkNumber,
        block: BlockNumber,
        buffer: &[u8; BLOCK_SIZE],
        _skip_sync: bool,
    ) -> StorageResult<()> {
        debug!("extend: block {} of {:?} {:?}", block, rel, fork);
        let mut store = self.open_store(rel, fork, true)?;
        codec::extend_by_one(&mut store, block)?;
        if declared_page_size(buffer) as usize == BLOCK_SIZE {
            codec::encode_page(&mut store, block, buffer)?;
        }
        store.close()
    }

    /// Number of blocks in the relation fork.
    ///
    /// Fails with `NotFound` when the namespace (or its counter) does not
    /// exist; the relation must have been created first.
    pub fn nblocks(&self, rel: RelFileLocator, fork: ForkNumber) -> StorageResult<u32> {
        let mut store = self.open_store(rel, fork, false)?;
        let count = meta::read_block_count(&mut store)?;
        store.close()?;
        debug!("nblocks: {:?} {:?} = {}", rel, fork, count);
        Ok(count)
    }

    /// Startup hook; the backend needs no per-process initialization.
    pub fn startup(&self) {}

    /// Close hook. Handles are opened and closed per call, so there is
    /// nothing to release.
    pub fn close_rel(&self, _rel: RelFileLocator, _fork: ForkNumber) {}

    /// Prefetching is not supported; reads are synchronous.
    pub fn prefetch(&self, _rel: RelFileLocator, _fork: ForkNumber, _block: BlockNumber) {}

    /// Unlink is not supported; namespaces are never deleted.
    pub fn unlink(&self, _rel: RelFileLocator, _fork: ForkNumber, _is_redo: bool) {}

    /// Truncation is not supported; the block count never decreases.
    pub fn truncate(&self, _rel: RelFileLocator, _fork: ForkNumber, _nblocks: BlockNumber) {}

    /// Every write is synced before it returns, so there is nothing left
    /// to force out.
    pub fn immediate_sync(&self, _rel: RelFileLocator, _fork: ForkNumber) {}

    fn open_store(
        &self,
        rel: RelFileLocator,
        fork: ForkNumber,
        create_if_missing: bool,
    ) -> StorageResult<KvStore> {
        let path = relpath::resolve(&self.root, rel, fork)?;
        KvStore::open(&path, create_if_missing)
    }
}

impl Default for StorageManager {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const REL: RelFileLocator = RelFileLocator {
        db_oid: 1,
        rel_number: 42,
    };

    #[test]
    fn test_exists_and_create() -> StorageResult<()> {
        let dir = tempdir().unwrap();
        let smgr = StorageManager::new(dir.path());

        assert!(!smgr.exists(REL, ForkNumber::Main)?);
        smgr.create(REL, ForkNumber::Main, false)?;
        assert!(smgr.exists(REL, ForkNumber::Main)?);
        // Other forks are independent namespaces.
        assert!(!smgr.exists(REL, ForkNumber::FreeSpaceMap)?);
        Ok(())
    }

    #[test]
    fn test_nblocks_requires_create() {
        let dir = tempdir().unwrap();
        let smgr = StorageManager::new(dir.path());

        assert!(matches!(
            smgr.nblocks(REL, ForkNumber::Main),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_create_starts_empty() -> StorageResult<()> {
        let dir = tempdir().unwrap();
        let smgr = StorageManager::new(dir.path());

        smgr.create(REL, ForkNumber::Main, false)?;
        assert_eq!(smgr.nblocks(REL, ForkNumber::Main)?, 0);
        Ok(())
    }

    #[test]
    fn test_redo_create_preserves_block_count() -> StorageResult<()> {
        let dir = tempdir().unwrap();
        let smgr = StorageManager::new(dir.path());

        smgr.create(REL, ForkNumber::Main, false)?;
        smgr.extend(REL, ForkNumber::Main, 0, &[0u8; BLOCK_SIZE], false)?;
        assert_eq!(smgr.nblocks(REL, ForkNumber::Main)?, 1);

        smgr.create(REL, ForkNumber::Main, true)?;
        assert_eq!(smgr.nblocks(REL, ForkNumber::Main)?, 1);

        // A plain re-create resets the counter.
        smgr.create(REL, ForkNumber::Main, false)?;
        assert_eq!(smgr.nblocks(REL, ForkNumber::Main)?, 0);
        Ok(())
    }

    #[test]
    fn test_read_requires_existing_namespace() {
        let dir = tempdir().unwrap();
        let smgr = StorageManager::new(dir.path());

        let mut out = [0u8; BLOCK_SIZE];
        assert!(matches!(
            smgr.read(REL, ForkNumber::Main, 0, &mut out),
            Err(StorageError::NotFound(_))
        ));
    }
}
