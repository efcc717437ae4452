//! # NVM controller interface
//!
//! ## Overview
//!
//! [`Nvmctrl`] is the boundary between the SmartEEPROM driver and the NVMCTRL
//! peripheral. It exposes the handful of registers the driver touches: the
//! controller and SmartEEPROM status registers, the address and command
//! registers (through [`Nvmctrl::set_address`] and [`Nvmctrl::execute`]), the
//! NVM user page, the SmartEEPROM window and the system reset.
//!
//! Two implementations ship with the crate:
//!
//! - `Samd51Nvmctrl` (feature `samd51`) accesses the real registers.
//! - `EmulatedNvmctrl` (feature `emulation`) models the controller in software
//!   for host-side testing.

use crate::user_page::{QUAD_WORD_SIZE, USER_PAGE_SIZE};

/// Address of the NVM user page.
pub const USER_PAGE_ADDR: u32 = 0x0080_4000;

/// NVMCTRL commands used by the driver (`CTRLB.CMD`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    /// Erase the page at `ADDR`.
    ErasePage = 0x00,
    /// Write the quad word at `ADDR` from the page buffer.
    WriteQuadWord = 0x04,
    /// Clear the page buffer.
    PageBufferClear = 0x15,
    /// Flush the SmartEEPROM page buffer. Ignores `ADDR`.
    SmartEepromFlush = 0x33,
}

/// NVM write mode (`CTRLA.WMODE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum WriteMode {
    /// Writes only happen on an explicit write command.
    Manual = 0,
    /// Automatic double word write.
    AutoDoubleWord = 1,
    /// Automatic quad word write.
    AutoQuadWord = 2,
    /// Automatic page write.
    AutoPage = 3,
}

/// SmartEEPROM write mode (`SEECFG.WMODE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SeeWriteMode {
    /// Every write is committed to flash immediately.
    #[default]
    Unbuffered,
    /// Writes are collected in the page buffer until the page changes or is
    /// flushed.
    Buffered,
}

/// Snapshot of the SmartEEPROM status register (`SEESTAT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SeeStatus(pub u32);

impl SeeStatus {
    /// Active SmartEEPROM sector.
    pub const ASEES: u32 = 1 << 0;
    /// Page buffer loaded with data not yet written to flash.
    pub const LOAD: u32 = 1 << 1;
    /// A SmartEEPROM operation is in progress.
    pub const BUSY: u32 = 1 << 2;
    /// SmartEEPROM section is write protected.
    pub const LOCK: u32 = 1 << 3;
    /// SmartEEPROM register address space is locked.
    pub const RLOCK: u32 = 1 << 4;

    const SBLK_SHIFT: u32 = 8;
    const SBLK_MASK: u32 = 0x0f << Self::SBLK_SHIFT;
    const PSZ_SHIFT: u32 = 16;
    const PSZ_MASK: u32 = 0x07 << Self::PSZ_SHIFT;

    /// Whether the SmartEEPROM is busy.
    pub const fn busy(self) -> bool {
        self.0 & Self::BUSY != 0
    }

    /// Whether the page buffer holds unwritten data.
    pub const fn load(self) -> bool {
        self.0 & Self::LOAD != 0
    }

    /// Whether the SmartEEPROM section is locked.
    pub const fn lock(self) -> bool {
        self.0 & Self::LOCK != 0
    }

    /// Blocks allocated to the SmartEEPROM, as latched at power on.
    pub const fn sblk(self) -> u8 {
        ((self.0 & Self::SBLK_MASK) >> Self::SBLK_SHIFT) as u8
    }

    /// Virtual page size selector, as latched at power on.
    pub const fn psz(self) -> u8 {
        ((self.0 & Self::PSZ_MASK) >> Self::PSZ_SHIFT) as u8
    }

    /// Packs the latched partition fields into a status value.
    pub const fn with_partition(self, psz: u8, sblk: u8) -> Self {
        Self(
            (self.0 & !Self::SBLK_MASK & !Self::PSZ_MASK)
                | (((sblk as u32) << Self::SBLK_SHIFT) & Self::SBLK_MASK)
                | (((psz as u32) << Self::PSZ_SHIFT) & Self::PSZ_MASK),
        )
    }
}

/// Register-level access to the NVMCTRL peripheral.
///
/// All methods are plain register accesses; none of them wait. Sequencing
/// and polling are the caller's job.
pub trait Nvmctrl {
    /// Reads `STATUS.READY`.
    fn is_ready(&mut self) -> bool;

    /// Reads `SEESTAT`.
    fn see_status(&mut self) -> SeeStatus;

    /// Sets `CTRLA.WMODE`.
    fn set_write_mode(&mut self, mode: WriteMode);

    /// Sets `SEECFG.WMODE`.
    fn set_see_write_mode(&mut self, mode: SeeWriteMode);

    /// Writes `ADDR`.
    fn set_address(&mut self, address: u32);

    /// Issues `command` with the execution key. Page commands act on the
    /// page selected by `ADDR`.
    fn execute(&mut self, command: Command);

    /// Copies the NVM user page into `page`.
    fn read_user_page(&mut self, page: &mut [u8; USER_PAGE_SIZE]);

    /// Writes one quad word into the page buffer at `offset` bytes into the
    /// user page.
    fn load_page_buffer(&mut self, offset: usize, data: &[u8; QUAD_WORD_SIZE]);

    /// Reads a byte from the SmartEEPROM window.
    fn see_read(&mut self, address: usize) -> u8;

    /// Writes a byte into the SmartEEPROM window.
    fn see_write(&mut self, address: usize, value: u8);

    /// Resets the whole system. Never returns.
    fn system_reset(&mut self) -> !;
}

impl<T> Nvmctrl for &mut T
where
    T: Nvmctrl + ?Sized,
{
    fn is_ready(&mut self) -> bool {
        (**self).is_ready()
    }

    fn see_status(&mut self) -> SeeStatus {
        (**self).see_status()
    }

    fn set_write_mode(&mut self, mode: WriteMode) {
        (**self).set_write_mode(mode)
    }

    fn set_see_write_mode(&mut self, mode: SeeWriteMode) {
        (**self).set_see_write_mode(mode)
    }

    fn set_address(&mut self, address: u32) {
        (**self).set_address(address)
    }

    fn execute(&mut self, command: Command) {
        (**self).execute(command)
    }

    fn read_user_page(&mut self, page: &mut [u8; USER_PAGE_SIZE]) {
        (**self).read_user_page(page)
    }

    fn load_page_buffer(&mut self, offset: usize, data: &[u8; QUAD_WORD_SIZE]) {
        (**self).load_page_buffer(offset, data)
    }

    fn see_read(&mut self, address: usize) -> u8 {
        (**self).see_read(address)
    }

    fn see_write(&mut self, address: usize, value: u8) {
        (**self).see_write(address, value)
    }

    fn system_reset(&mut self) -> ! {
        (**self).system_reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn see_status_fields() {
        let status = SeeStatus(SeeStatus::BUSY | SeeStatus::LOCK).with_partition(3, 1);

        assert!(status.busy());
        assert!(status.lock());
        assert!(!status.load());
        assert_eq!(status.psz(), 3);
        assert_eq!(status.sblk(), 1);
        assert_eq!(status.0, 0x0003_010c);
    }

    #[test]
    fn with_partition_replaces_previous_fields() {
        let status = SeeStatus::default().with_partition(7, 10).with_partition(0, 1);
        assert_eq!(status.psz(), 0);
        assert_eq!(status.sblk(), 1);
    }
}
