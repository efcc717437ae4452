//! # SmartEEPROM fuses
//!
//! The layout of the SmartEEPROM is selected by two fields of the NVM user
//! page, both packed into the byte at [`SEE_FUSES_OFFSET`]:
//!
//! | Field     | Bits | Meaning                                           |
//! |-----------|------|---------------------------------------------------|
//! | `SEESBLK` | 3:0  | Number of 8 KiB flash blocks reserved per bank    |
//! | `SEEPSZ`  | 6:4  | Virtual page size, `4 << SEEPSZ` bytes            |
//!
//! Bit 7 belongs to an unrelated fuse and is always preserved.
//!
//! The fields are read by the controller at power on only. Changing them
//! requires rewriting the user page and resetting the chip.

/// Offset of the SmartEEPROM fuse byte within the user page.
pub const SEE_FUSES_OFFSET: usize = 4;

const SEESBLK_SHIFT: u8 = 0;
const SEESBLK_MASK: u8 = 0x0f << SEESBLK_SHIFT;
const SEEPSZ_SHIFT: u8 = 4;
const SEEPSZ_MASK: u8 = 0x07 << SEEPSZ_SHIFT;

/// A SmartEEPROM partition, as encoded by the `SEEPSZ` and `SEESBLK` fuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Partition {
    /// Virtual page size selector (`SEEPSZ`).
    pub page_size: u8,
    /// Number of reserved flash blocks (`SEESBLK`).
    pub start_block: u8,
}

/// One entry of [`CAPACITY_TABLE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CapacityEntry {
    /// Emulated EEPROM size in bytes.
    pub size: usize,
    /// Fuses producing that size.
    pub partition: Partition,
}

const fn entry(size: usize, page_size: u8, start_block: u8) -> CapacityEntry {
    CapacityEntry {
        size,
        partition: Partition {
            page_size,
            start_block,
        },
    }
}

/// Every emulated EEPROM size the controller supports.
///
/// Sizes up to 4 KiB fit in a single 8 KiB block per bank (16 KiB of flash
/// in total), larger ones need progressively more blocks.
pub const CAPACITY_TABLE: [CapacityEntry; 9] = [
    entry(0, 0, 0),
    entry(512, 0, 1),
    entry(1024, 1, 1),
    entry(2048, 2, 1),
    entry(4096, 3, 1),
    entry(8192, 4, 2),
    entry(16384, 5, 3),
    entry(32768, 6, 5),
    entry(65536, 7, 10),
];

impl Partition {
    /// Looks up the partition for an emulated EEPROM size.
    ///
    /// Only exact matches are accepted; there is no rounding up.
    pub const fn for_capacity(size: usize) -> Option<Self> {
        let mut i = 0;
        while i < CAPACITY_TABLE.len() {
            if CAPACITY_TABLE[i].size == size {
                return Some(CAPACITY_TABLE[i].partition);
            }
            i += 1;
        }
        None
    }

    /// Maps the partition back to its emulated EEPROM size.
    ///
    /// Returns `None` for fuse combinations the table does not list, such as
    /// the ones found on an erased user page.
    pub const fn capacity(self) -> Option<usize> {
        let mut i = 0;
        while i < CAPACITY_TABLE.len() {
            let partition = CAPACITY_TABLE[i].partition;
            if partition.page_size == self.page_size && partition.start_block == self.start_block {
                return Some(CAPACITY_TABLE[i].size);
            }
            i += 1;
        }
        None
    }

    /// Extracts the partition from a packed fuse byte.
    pub const fn decode(fuses: u8) -> Self {
        Self {
            page_size: (fuses & SEEPSZ_MASK) >> SEEPSZ_SHIFT,
            start_block: (fuses & SEESBLK_MASK) >> SEESBLK_SHIFT,
        }
    }

    /// Replaces the `SEEPSZ` and `SEESBLK` fields of `fuses`, keeping every
    /// other bit.
    pub const fn apply(self, fuses: u8) -> u8 {
        (fuses & !SEEPSZ_MASK & !SEESBLK_MASK)
            | ((self.page_size << SEEPSZ_SHIFT) & SEEPSZ_MASK)
            | ((self.start_block << SEESBLK_SHIFT) & SEESBLK_MASK)
    }

    /// Size of a SmartEEPROM virtual page in bytes.
    ///
    /// Only the three bits `SEEPSZ` can hold are taken into account.
    pub const fn page_bytes(self) -> usize {
        4 << (self.page_size & (SEEPSZ_MASK >> SEEPSZ_SHIFT))
    }
}

/// How a fuse change has to be written back to the user page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transition {
    /// At least one bit goes from 0 to 1. Flash programming can only clear
    /// bits, so the page is erased and rewritten in full.
    Format,
    /// Bits are only cleared. The page is programmed in place up to the
    /// quad word holding the fuse byte.
    Patch,
}

impl Transition {
    /// Classifies the change from `old` to `new` fuses.
    pub const fn classify(old: u8, new: u8) -> Self {
        if (old ^ new) & new != 0 {
            Self::Format
        } else {
            Self::Patch
        }
    }

    /// Number of leading user page bytes to write back.
    ///
    /// Rounded up to whole quad words by the writer.
    pub const fn rewrite_len(self) -> usize {
        match self {
            Self::Format => crate::user_page::USER_PAGE_SIZE,
            Self::Patch => SEE_FUSES_OFFSET + 1,
        }
    }
}
