use crate::error::{StorageError, StorageResult};
use byteorder::{LittleEndian, WriteBytesExt};
use bytes::Bytes;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

// Record framing: key_len (u32 LE) | val_len (u32 LE) | key | value.
// val_len == TOMBSTONE marks a deletion and carries no value bytes.
const RECORD_HEADER_SIZE: u64 = 8;
const TOMBSTONE: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct ValueLocation {
    offset: u64,
    len: u32,
}

/// An append-only key-value store backed by a single log file.
///
/// The full key index is rebuilt by replaying the log on open; the last
/// record for a key wins. Every mutation is synced before it returns, so
/// a completed `put` or `delete` is immediately visible to the next open.
/// Dropping the store releases the file; `close` additionally syncs.
pub struct KvStore {
    file: File,
    path: PathBuf,
    index: HashMap<Vec<u8>, ValueLocation>,
    end: u64,
}

impl KvStore {
    /// Open the store at `path`.
    ///
    /// With `create_if_missing` set, a missing store (and its parent
    /// directory) is created empty; otherwise a missing store fails with
    /// `NotFound`. This is the only `NotFound` an existence probe may see.
    pub fn open(path: &Path, create_if_missing: bool) -> StorageResult<Self> {
        if create_if_missing {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(create_if_missing)
            .open(path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(format!(
                    "namespace {}",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let (index, end) = Self::replay(&file)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            index,
            end,
        })
    }

    /// Look up `key`. Absent keys are `None`, not an error.
    pub fn get(&mut self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        let Some(location) = self.index.get(key).copied() else {
            return Ok(None);
        };
        let mut buf = vec![0u8; location.len as usize];
        self.file.seek(SeekFrom::Start(location.offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(Some(Bytes::from(buf)))
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        if value.len() >= TOMBSTONE as usize {
            return Err(StorageError::Backend(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("value of {} bytes exceeds record limit", value.len()),
            )));
        }

        let mut record =
            Vec::with_capacity(RECORD_HEADER_SIZE as usize + key.len() + value.len());
        record.write_u32::<LittleEndian>(key.len() as u32)?;
        record.write_u32::<LittleEndian>(value.len() as u32)?;
        record.extend_from_slice(key);
        record.extend_from_slice(value);
        self.append(&record)?;

        let offset = self.end + RECORD_HEADER_SIZE + key.len() as u64;
        self.index.insert(
            key.to_vec(),
            ValueLocation {
                offset,
                len: value.len() as u32,
            },
        );
        self.end += record.len() as u64;
        Ok(())
    }

    /// Remove `key` if present. Deleting an absent key is a no-op.
    pub fn delete(&mut self, key: &[u8]) -> StorageResult<()> {
        if self.index.remove(key).is_none() {
            return Ok(());
        }

        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE as usize + key.len());
        record.write_u32::<LittleEndian>(key.len() as u32)?;
        record.write_u32::<LittleEndian>(TOMBSTONE)?;
        record.extend_from_slice(key);
        self.append(&record)?;
        self.end += record.len() as u64;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sync and release the store.
    pub fn close(self) -> StorageResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn append(&mut self, record: &[u8]) -> StorageResult<()> {
        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(record)?;
        self.file.sync_data()?;
        Ok(())
    }

    fn replay(file: &File) -> StorageResult<(HashMap<Vec<u8>, ValueLocation>, u64)> {
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut index = HashMap::new();
        let mut pos: u64 = 0;

        while pos < file_len {
            if file_len - pos < RECORD_HEADER_SIZE {
                return Err(truncated_log(pos));
            }
            let mut header = [0u8; RECORD_HEADER_SIZE as usize];
            reader.read_exact(&mut header)?;
            let key_len =
                u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as u64;
            let val_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if pos + RECORD_HEADER_SIZE + key_len > file_len {
                return Err(truncated_log(pos));
            }
            let mut key = vec![0u8; key_len as usize];
            reader.read_exact(&mut key)?;

            if val_len == TOMBSTONE {
                index.remove(&key);
                pos += RECORD_HEADER_SIZE + key_len;
            } else {
                let offset = pos + RECORD_HEADER_SIZE + key_len;
                if offset + val_len as u64 > file_len {
                    return Err(truncated_log(pos));
                }
                reader.seek_relative(val_len as i64)?;
                index.insert(
                    key,
                    ValueLocation {
                        offset,
                        len: val_len,
                    },
                );
                pos = offset + val_len as u64;
            }
        }

        Ok((index, pos))
    }
}

fn truncated_log(record_start: u64) -> StorageError {
    StorageError::Backend(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("truncated log record at offset {}", record_start),
    ))
}
