//! Slotted page format: fixed-size blocks holding a slot directory,
//! variable-length items, and a reserved special region at the tail.

pub mod slotted;

/// Fixed size of every block, in bytes.
pub const BLOCK_SIZE: usize = 8192;

/// Zero-based block number within a relation fork.
pub type BlockNumber = u32;

pub use slotted::{declared_page_size, item_self_slot, SlotState, SlottedPage, FIRST_SLOT};
