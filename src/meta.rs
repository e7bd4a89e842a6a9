//! Per-relation metadata held in the backend store.
//!
//! Three kinds of entries live alongside the tuple data: the relation-wide
//! block count (`NUM_BLOCKS`), a per-block tuple count (`"<block>B"`), and
//! a per-block special-space size (`"<block>BS"`). Values are 4-byte
//! little-endian; keys are ASCII. Accessors are plain get/put
//! pass-throughs with no caching or retries.

use crate::error::{StorageError, StorageResult};
use crate::kv::KvStore;
use crate::page::BlockNumber;
use byteorder::{ByteOrder, LittleEndian};

/// Key of the relation-wide block counter.
pub const BLOCK_COUNT_KEY: &[u8] = b"NUM_BLOCKS";

/// Key of a block's tuple count.
pub fn tuple_count_key(block: BlockNumber) -> Vec<u8> {
    format!("{}B", block).into_bytes()
}

/// Key of a block's special-space size.
pub fn special_size_key(block: BlockNumber) -> Vec<u8> {
    format!("{}BS", block).into_bytes()
}

/// Key of the tuple stored at `slot` of `block`.
pub fn tuple_key(block: BlockNumber, slot: u16) -> Vec<u8> {
    format!("{}B{}", block, slot).into_bytes()
}

/// Set up a freshly created namespace: block count 0, nothing else.
pub fn initialize(store: &mut KvStore) -> StorageResult<()> {
    write_block_count(store, 0)
}

/// Total number of blocks extended into this namespace.
///
/// Absent in a namespace that was never created through this layer;
/// that is reported as `NotFound` and the caller decides whether it
/// means "no such relation" or corruption.
pub fn read_block_count(store: &mut KvStore) -> StorageResult<u32> {
    match store.get(BLOCK_COUNT_KEY)? {
        Some(value) => decode_u32("NUM_BLOCKS", &value),
        None => Err(StorageError::NotFound(format!(
            "NUM_BLOCKS in {}",
            store.path().display()
        ))),
    }
}

pub fn write_block_count(store: &mut KvStore, count: u32) -> StorageResult<()> {
    store.put(BLOCK_COUNT_KEY, &encode_u32(count))
}

pub fn read_tuple_count(store: &mut KvStore, block: BlockNumber) -> StorageResult<Option<u32>> {
    match store.get(&tuple_count_key(block))? {
        Some(value) => Ok(Some(decode_u32("tuple count", &value)?)),
        None => Ok(None),
    }
}

pub fn write_tuple_count(
    store: &mut KvStore,
    block: BlockNumber,
    count: u32,
) -> StorageResult<()> {
    store.put(&tuple_count_key(block), &encode_u32(count))
}

/// Special-space size of `block`; `None` when no entry was ever written
/// (legal for placeholder blocks, which decode with special size 0).
pub fn read_special_size(store: &mut KvStore, block: BlockNumber) -> StorageResult<Option<u32>> {
    match store.get(&special_size_key(block))? {
        Some(value) => Ok(Some(decode_u32("special size", &value)?)),
        None => Ok(None),
    }
}

pub fn write_special_size(
    store: &mut KvStore,
    block: BlockNumber,
    size: u32,
) -> StorageResult<()> {
    store.put(&special_size_key(block), &encode_u32(size))
}

fn encode_u32(value: u32) -> [u8; 4] {
    let mut buf = [0u8; 4];
    LittleEndian::write_u32(&mut buf, value);
    buf
}

fn decode_u32(what: &str, bytes: &[u8]) -> StorageResult<u32> {
    if bytes.len() != 4 {
        return Err(StorageError::CorruptMetadata(format!(
            "{} entry is {} bytes, expected 4",
            what,
            bytes.len()
        )));
    }
    Ok(LittleEndian::read_u32(bytes))
}
