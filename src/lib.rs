//! relkv maps a relational engine's fixed-size block operations onto a
//! log-structured key-value backend: one store per relation fork, slotted
//! pages decomposed into per-tuple entries plus block metadata.

pub mod codec;
pub mod error;
pub mod kv;
pub mod meta;
pub mod page;
pub mod relpath;
pub mod smgr;

pub use error::{StorageError, StorageResult};
pub use kv::KvStore;
pub use page::{BlockNumber, SlotState, SlottedPage, BLOCK_SIZE};
pub use relpath::{ForkNumber, RelFileLocator};
pub use smgr::{StorageManager, DEFAULT_ROOT};
