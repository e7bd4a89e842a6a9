//! Page codec: decomposes a page image into metadata and per-tuple
//! entries on write, and replays those entries into a fresh page on read.
//!
//! A real data page declares the fixed block size in its header. Any
//! other declared size (zero-filled images in particular) is the host's
//! convention for "grow the relation by one block"; those images are
//! never stored, only counted.

use crate::error::{StorageError, StorageResult};
use crate::kv::KvStore;
use crate::meta;
use crate::page::{
    declared_page_size, item_self_slot, BlockNumber, SlottedPage, BLOCK_SIZE, FIRST_SLOT,
};
use log::debug;
use std::collections::HashSet;

/// Persist a page image at `block`, or grow the relation if the image is
/// a placeholder. Overwrite semantics: metadata is replaced and slot keys
/// from the previous image that the new image does not cover are removed.
pub fn encode_page(
    store: &mut KvStore,
    block: BlockNumber,
    buffer: &[u8; BLOCK_SIZE],
) -> StorageResult<()> {
    if declared_page_size(buffer) as usize == BLOCK_SIZE {
        let mut image = *buffer;
        let page = SlottedPage::from_bytes(&mut image);
        encode_data_page(store, block, &page)
    } else {
        extend_by_one(store, block)?;
        Ok(())
    }
}

fn encode_data_page(
    store: &mut KvStore,
    block: BlockNumber,
    page: &SlottedPage<'_>,
) -> StorageResult<()> {
    let previous_count = meta::read_tuple_count(store, block)?;
    let max_slot = page.max_slot();
    debug!("block {}: storing data page, {} directory slots", block, max_slot);

    meta::write_tuple_count(store, block, max_slot as u32)?;
    meta::write_special_size(store, block, page.special_size() as u32)?;

    let mut written = HashSet::new();
    for slot in FIRST_SLOT..=max_slot {
        if !page.is_normal(slot) {
            continue;
        }
        let item = page.item(slot)?;
        // Tuples are keyed by their own slot field, not the directory
        // index; the two agree as long as the host keeps them in sync.
        let self_slot = item_self_slot(item).ok_or_else(|| {
            StorageError::CorruptMetadata(format!(
                "item at slot {} of block {} is too short to carry a slot field",
                slot, block
            ))
        })?;
        debug!("block {}: writing tuple {}", block, self_slot);
        store.put(&meta::tuple_key(block, self_slot), item)?;
        written.insert(self_slot);
    }

    // Drop entries from the previous image that this one did not
    // re-write, so a shrinking rewrite leaves no orphaned slots.
    if let Some(previous) = previous_count {
        for slot in FIRST_SLOT..=previous.min(u16::MAX as u32) as u16 {
            if !written.contains(&slot) {
                store.delete(&meta::tuple_key(block, slot))?;
            }
        }
    }
    Ok(())
}

/// Record one more block in the relation: bump the block counter and give
/// the new block an empty tuple directory. No special-size entry is
/// written; readers treat its absence as size 0.
pub fn extend_by_one(store: &mut KvStore, block: BlockNumber) -> StorageResult<u32> {
    let current = match meta::read_block_count(store) {
        Ok(count) => count,
        Err(StorageError::NotFound(_)) => {
            return Err(StorageError::CorruptMetadata(format!(
                "NUM_BLOCKS missing in {}; relation was never created",
                store.path().display()
            )));
        }
        Err(e) => return Err(e),
    };
    let grown = current + 1;
    debug!("block {}: placeholder image, growing relation to {} blocks", block, grown);
    meta::write_block_count(store, grown)?;
    meta::write_tuple_count(store, block, 0)?;
    Ok(grown)
}

/// Rebuild the page stored at `block` into `out`.
///
/// The page is assembled in a scratch image and copied out only on full
/// success; a failed read leaves `out` untouched.
pub fn decode_page(
    store: &mut KvStore,
    block: BlockNumber,
    out: &mut [u8; BLOCK_SIZE],
) -> StorageResult<()> {
    let tuple_count = meta::read_tuple_count(store, block)?.ok_or_else(|| {
        StorageError::CorruptMetadata(format!("block {} has no tuple-count entry", block))
    })?;
    let special_size = meta::read_special_size(store, block)?.unwrap_or(0);

    if tuple_count > u16::MAX as u32 {
        return Err(StorageError::CorruptMetadata(format!(
            "block {} records an impossible tuple count {}",
            block, tuple_count
        )));
    }
    if special_size as usize > BLOCK_SIZE {
        return Err(StorageError::CorruptMetadata(format!(
            "block {} records an impossible special size {}",
            block, special_size
        )));
    }
    debug!(
        "block {}: rebuilding page, {} tuple slots, special size {}",
        block, tuple_count, special_size
    );

    let mut image = [0u8; BLOCK_SIZE];
    {
        let mut page = SlottedPage::init(&mut image, special_size as u16)?;
        for slot in FIRST_SLOT..=tuple_count as u16 {
            // Absent entries were non-normal slots at store time; the
            // directory is positional, so surviving tuples are appended
            // in increasing slot order.
            if let Some(item) = store.get(&meta::tuple_key(block, slot))? {
                page.add_item(&item)?;
            }
        }
    }
    *out = image;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::SlotState;
    use tempfile::tempdir;

    fn open_store(dir: &tempfile::TempDir) -> KvStore {
        let mut store = KvStore::open(&dir.path().join("codec.kv"), true).unwrap();
        meta::initialize(&mut store).unwrap();
        store
    }

    fn tuple(slot: u16, payload: &[u8]) -> Vec<u8> {
        let mut item = slot.to_le_bytes().to_vec();
        item.extend_from_slice(payload);
        item
    }

    fn data_page(special_size: u16, payloads: &[&[u8]]) -> Box<[u8; BLOCK_SIZE]> {
        let mut image = Box::new([0u8; BLOCK_SIZE]);
        let mut page = SlottedPage::init(&mut image, special_size).unwrap();
        for (i, payload) in payloads.iter().enumerate() {
            let slot = page.add_item(&tuple(i as u16 + 1, payload)).unwrap();
            assert_eq!(slot, i as u16 + 1);
        }
        image
    }

    #[test]
    fn test_data_page_roundtrip() -> StorageResult<()> {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir);

        let image = data_page(8, &[b"first tuple", b"second tuple"]);
        encode_page(&mut store, 0, &image)?;

        let mut out = [0u8; BLOCK_SIZE];
        decode_page(&mut store, 0, &mut out)?;

        let page = SlottedPage::from_bytes(&mut out);
        assert_eq!(page.declared_size() as usize, BLOCK_SIZE);
        assert_eq!(page.special_size(), 8);
        assert_eq!(page.max_slot(), 2);
        assert_eq!(page.item(1)?, tuple(1, b"first tuple").as_slice());
        assert_eq!(page.item(2)?, tuple(2, b"second tuple").as_slice());
        Ok(())
    }

    #[test]
    fn test_placeholder_grows_relation() -> StorageResult<()> {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir);

        let zeroes = Box::new([0u8; BLOCK_SIZE]);
        encode_page(&mut store, 0, &zeroes)?;
        assert_eq!(meta::read_block_count(&mut store)?, 1);
        assert_eq!(meta::read_tuple_count(&mut store, 0)?, Some(0));
        assert_eq!(meta::read_special_size(&mut store, 0)?, None);

        encode_page(&mut store, 1, &zeroes)?;
        assert_eq!(meta::read_block_count(&mut store)?, 2);
        Ok(())
    }

    #[test]
    fn test_placeholder_block_decodes_empty() -> StorageResult<()> {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir);

        encode_page(&mut store, 0, &[0u8; BLOCK_SIZE])?;

        let mut out = [0u8; BLOCK_SIZE];
        decode_page(&mut store, 0, &mut out)?;
        let page = SlottedPage::from_bytes(&mut out);
        assert_eq!(page.declared_size() as usize, BLOCK_SIZE);
        assert_eq!(page.max_slot(), 0);
        assert_eq!(page.special_size(), 0);
        Ok(())
    }

    #[test]
    fn test_extend_without_create_is_corrupt() {
        let dir = tempdir().unwrap();
        // No meta::initialize here: the namespace exists but was never created.
        let mut store = KvStore::open(&dir.path().join("bare.kv"), true).unwrap();

        let result = extend_by_one(&mut store, 0);
        assert!(matches!(result, Err(StorageError::CorruptMetadata(_))));
    }

    #[test]
    fn test_decode_unknown_block_is_corrupt() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir);

        let mut out = [0u8; BLOCK_SIZE];
        out[0] = 0xEE;
        let result = decode_page(&mut store, 9, &mut out);
        assert!(matches!(result, Err(StorageError::CorruptMetadata(_))));
        // The failed read must not have touched the caller's buffer.
        assert_eq!(out[0], 0xEE);
    }

    #[test]
    fn test_dead_slot_is_not_persisted() -> StorageResult<()> {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir);

        let mut image = data_page(0, &[b"keep", b"kill", b"keep too"]);
        {
            let mut page = SlottedPage::from_bytes(&mut image);
            page.set_slot_state(2, SlotState::Dead)?;
        }
        encode_page(&mut store, 0, &image)?;

        assert_eq!(meta::read_tuple_count(&mut store, 0)?, Some(3));
        assert!(store.get(&meta::tuple_key(0, 2))?.is_none());

        let mut out = [0u8; BLOCK_SIZE];
        decode_page(&mut store, 0, &mut out)?;
        let page = SlottedPage::from_bytes(&mut out);
        // Survivors compact into the directory but keep their own slot fields.
        assert_eq!(page.max_slot(), 2);
        assert_eq!(page.item(1)?, tuple(1, b"keep").as_slice());
        assert_eq!(page.item(2)?, tuple(3, b"keep too").as_slice());
        Ok(())
    }

    #[test]
    fn test_shrinking_rewrite_cleans_stale_entries() -> StorageResult<()> {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir);

        let wide = data_page(0, &[b"one", b"two", b"three", b"four"]);
        encode_page(&mut store, 0, &wide)?;
        assert!(store.get(&meta::tuple_key(0, 4))?.is_some());

        let narrow = data_page(0, &[b"one", b"two"]);
        encode_page(&mut store, 0, &narrow)?;

        assert_eq!(meta::read_tuple_count(&mut store, 0)?, Some(2));
        assert!(store.get(&meta::tuple_key(0, 3))?.is_none());
        assert!(store.get(&meta::tuple_key(0, 4))?.is_none());

        let mut out = [0u8; BLOCK_SIZE];
        decode_page(&mut store, 0, &mut out)?;
        let page = SlottedPage::from_bytes(&mut out);
        assert_eq!(page.max_slot(), 2);
        Ok(())
    }

    #[test]
    fn test_rewrite_replaces_metadata() -> StorageResult<()> {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir);

        encode_page(&mut store, 0, &data_page(16, &[b"v1"]))?;
        encode_page(&mut store, 0, &data_page(32, &[b"v2", b"extra"]))?;

        assert_eq!(meta::read_special_size(&mut store, 0)?, Some(32));
        assert_eq!(meta::read_tuple_count(&mut store, 0)?, Some(2));
        assert_eq!(
            store.get(&meta::tuple_key(0, 1))?.as_deref(),
            Some(tuple(1, b"v2").as_slice())
        );
        Ok(())
    }
}
