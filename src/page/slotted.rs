use crate::error::{StorageError, StorageResult};
use crate::page::BLOCK_SIZE;

// Header structure (8 bytes)
const HEADER_SIZE: usize = 8;
const FREE_START_OFFSET: usize = 0;
const FREE_END_OFFSET: usize = 2;
const SPECIAL_START_OFFSET: usize = 4;
const DECLARED_SIZE_OFFSET: usize = 6;

// Slot directory entry (6 bytes: 2 offset, 2 length, 2 state flags)
const SLOT_SIZE: usize = 6;

/// Slot numbers are 1-based; 0 is never a valid slot.
pub const FIRST_SLOT: u16 = 1;

/// State of a slot directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Unused,
    Normal,
    Redirect,
    Dead,
}

impl SlotState {
    fn from_flags(flags: u16) -> Option<SlotState> {
        match flags {
            0 => Some(SlotState::Unused),
            1 => Some(SlotState::Normal),
            2 => Some(SlotState::Redirect),
            3 => Some(SlotState::Dead),
            _ => None,
        }
    }

    fn to_flags(self) -> u16 {
        match self {
            SlotState::Unused => 0,
            SlotState::Normal => 1,
            SlotState::Redirect => 2,
            SlotState::Dead => 3,
        }
    }
}

/// Declared page size of a raw block image, without building a view.
/// A zero-filled or never-initialized image reports 0.
pub fn declared_page_size(buffer: &[u8; BLOCK_SIZE]) -> u16 {
    u16::from_le_bytes([
        buffer[DECLARED_SIZE_OFFSET],
        buffer[DECLARED_SIZE_OFFSET + 1],
    ])
}

/// Read the item's self-identifying slot field (first two bytes).
///
/// Items inserted by the host carry the slot number they were assigned;
/// the codec keys persisted tuples by this field, not by the directory
/// index the item currently sits at.
pub fn item_self_slot(item: &[u8]) -> Option<u16> {
    if item.len() < 2 {
        return None;
    }
    Some(u16::from_le_bytes([item[0], item[1]]))
}

/// A slotted page view over a fixed-size block buffer.
///
/// Layout: header, slot directory growing upward, free space, item data
/// growing downward, special region at the tail. A zero-filled buffer
/// reports a declared size of 0, which is how placeholder (extend) images
/// are distinguished from real data pages.
pub struct SlottedPage<'a> {
    data: &'a mut [u8; BLOCK_SIZE],
}

impl<'a> SlottedPage<'a> {
    /// Initialize an empty page with the given special-space size.
    pub fn init(data: &'a mut [u8; BLOCK_SIZE], special_size: u16) -> StorageResult<Self> {
        let required = HEADER_SIZE + special_size as usize;
        if required > BLOCK_SIZE {
            return Err(StorageError::PageFull {
                required,
                available: BLOCK_SIZE,
            });
        }

        data.fill(0);
        let special_start = (BLOCK_SIZE - special_size as usize) as u16;
        let mut page = Self { data };
        page.set_u16(FREE_START_OFFSET, HEADER_SIZE as u16);
        page.set_u16(FREE_END_OFFSET, special_start);
        page.set_u16(SPECIAL_START_OFFSET, special_start);
        page.set_u16(DECLARED_SIZE_OFFSET, BLOCK_SIZE as u16);
        Ok(page)
    }

    pub fn from_bytes(data: &'a mut [u8; BLOCK_SIZE]) -> Self {
        Self { data }
    }

    /// Page size recorded in the header; 0 for a never-initialized buffer.
    pub fn declared_size(&self) -> u16 {
        self.get_u16(DECLARED_SIZE_OFFSET)
    }

    /// Size of the reserved special region at the tail of the page.
    pub fn special_size(&self) -> u16 {
        self.declared_size()
            .saturating_sub(self.get_u16(SPECIAL_START_OFFSET))
    }

    /// Highest slot number in the directory (0 when the page is empty).
    pub fn max_slot(&self) -> u16 {
        let free_start = self.get_u16(FREE_START_OFFSET) as usize;
        (free_start.saturating_sub(HEADER_SIZE) / SLOT_SIZE) as u16
    }

    pub fn slot_state(&self, slot: u16) -> StorageResult<SlotState> {
        self.check_slot(slot)?;
        let flags = self.get_u16(Self::slot_offset(slot) + 4);
        SlotState::from_flags(flags).ok_or_else(|| {
            StorageError::CorruptMetadata(format!("slot {} has invalid state flags {}", slot, flags))
        })
    }

    /// True if the slot holds a live item. Out-of-range slots are not normal.
    pub fn is_normal(&self, slot: u16) -> bool {
        matches!(self.slot_state(slot), Ok(SlotState::Normal))
    }

    /// Raw bytes of the item stored at `slot`.
    pub fn item(&self, slot: u16) -> StorageResult<&[u8]> {
        self.check_slot(slot)?;
        let entry = Self::slot_offset(slot);
        let offset = self.get_u16(entry) as usize;
        let len = self.get_u16(entry + 2) as usize;
        if self.slot_state(slot)? == SlotState::Unused {
            return Err(StorageError::TupleNotFound { slot });
        }
        Ok(&self.data[offset..offset + len])
    }

    /// Append an item at the next available slot and return that slot.
    pub fn add_item(&mut self, item: &[u8]) -> StorageResult<u16> {
        let slot = self.max_slot() + 1;
        let required = item.len() + SLOT_SIZE;
        let available = self.free_space();
        if required > available {
            return Err(StorageError::PageFull {
                required,
                available,
            });
        }

        let free_end = self.get_u16(FREE_END_OFFSET);
        let item_offset = free_end - item.len() as u16;
        self.data[item_offset as usize..free_end as usize].copy_from_slice(item);

        let entry = Self::slot_offset(slot);
        self.set_u16(entry, item_offset);
        self.set_u16(entry + 2, item.len() as u16);
        self.set_u16(entry + 4, SlotState::Normal.to_flags());

        self.set_u16(FREE_START_OFFSET, (entry + SLOT_SIZE) as u16);
        self.set_u16(FREE_END_OFFSET, item_offset);
        Ok(slot)
    }

    /// Change a slot's state without touching its item storage.
    pub fn set_slot_state(&mut self, slot: u16, state: SlotState) -> StorageResult<()> {
        self.check_slot(slot)?;
        self.set_u16(Self::slot_offset(slot) + 4, state.to_flags());
        Ok(())
    }

    pub fn free_space(&self) -> usize {
        let free_start = self.get_u16(FREE_START_OFFSET) as usize;
        let free_end = self.get_u16(FREE_END_OFFSET) as usize;
        free_end.saturating_sub(free_start)
    }

    fn check_slot(&self, slot: u16) -> StorageResult<()> {
        let max = self.max_slot();
        if slot < FIRST_SLOT || slot > max {
            return Err(StorageError::InvalidSlot { slot, max });
        }
        Ok(())
    }

    fn slot_offset(slot: u16) -> usize {
        HEADER_SIZE + (slot - FIRST_SLOT) as usize * SLOT_SIZE
    }

    fn get_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }

    fn set_u16(&mut self, offset: usize, value: u16) {
        self.data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }
}
