//! NVMCTRL register access for SAM D5x/E5x.

use core::ptr;

use atsamd51j::Nvmctrl as NVMCTRL;
use cortex_m::peripheral::SCB;

use crate::{
    nvmctrl::{Command, Nvmctrl, SeeStatus, SeeWriteMode, USER_PAGE_ADDR, WriteMode},
    user_page::{QUAD_WORD_SIZE, USER_PAGE_SIZE},
};

/// Start of the SmartEEPROM data window.
const SEEPROM_ADDR: usize = 0x4400_0000;

/// The NVMCTRL peripheral of a SAM D5x/E5x.
#[derive(Debug)]
pub struct Samd51Nvmctrl {
    nvmctrl: NVMCTRL,
}

impl Samd51Nvmctrl {
    /// Takes ownership of the NVMCTRL peripheral.
    pub fn new(nvmctrl: NVMCTRL) -> Self {
        Self { nvmctrl }
    }

    /// Releases the NVMCTRL peripheral.
    pub fn free(self) -> NVMCTRL {
        self.nvmctrl
    }
}

impl Nvmctrl for Samd51Nvmctrl {
    #[inline(always)]
    fn is_ready(&mut self) -> bool {
        self.nvmctrl.status().read().ready().bit_is_set()
    }

    #[inline(always)]
    fn see_status(&mut self) -> SeeStatus {
        SeeStatus(self.nvmctrl.seestat().read().bits())
    }

    fn set_write_mode(&mut self, mode: WriteMode) {
        self.nvmctrl.ctrla().modify(|_, w| match mode {
            WriteMode::Manual => w.wmode().man(),
            WriteMode::AutoDoubleWord => w.wmode().adw(),
            WriteMode::AutoQuadWord => w.wmode().aqw(),
            WriteMode::AutoPage => w.wmode().ap(),
        });
    }

    fn set_see_write_mode(&mut self, mode: SeeWriteMode) {
        self.nvmctrl.seecfg().modify(|_, w| match mode {
            SeeWriteMode::Unbuffered => w.wmode().unbuffered(),
            SeeWriteMode::Buffered => w.wmode().buffered(),
        });
    }

    fn set_address(&mut self, address: u32) {
        self.nvmctrl.addr().write(|w| unsafe { w.addr().bits(address) });
    }

    fn execute(&mut self, command: Command) {
        self.nvmctrl.ctrlb().write(|w| {
            let w = w.cmdex().key();
            match command {
                Command::ErasePage => w.cmd().ep(),
                Command::WriteQuadWord => w.cmd().wqw(),
                Command::PageBufferClear => w.cmd().pbc(),
                Command::SmartEepromFlush => w.cmd().seeflush(),
            }
        });
    }

    fn read_user_page(&mut self, page: &mut [u8; USER_PAGE_SIZE]) {
        let user_page = USER_PAGE_ADDR as usize as *const u8;
        for (offset, byte) in page.iter_mut().enumerate() {
            *byte = unsafe { ptr::read_volatile(user_page.add(offset)) };
        }
    }

    fn load_page_buffer(&mut self, offset: usize, data: &[u8; QUAD_WORD_SIZE]) {
        // The page buffer only accepts 32-bit writes.
        let dst = (USER_PAGE_ADDR as usize + offset) as *mut u32;
        for (index, word) in data.chunks_exact(4).enumerate() {
            let word = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            unsafe { ptr::write_volatile(dst.add(index), word) };
        }
    }

    #[inline(always)]
    fn see_read(&mut self, address: usize) -> u8 {
        unsafe { ptr::read_volatile((SEEPROM_ADDR + address) as *const u8) }
    }

    #[inline(always)]
    fn see_write(&mut self, address: usize, value: u8) {
        unsafe { ptr::write_volatile((SEEPROM_ADDR + address) as *mut u8, value) }
    }

    fn system_reset(&mut self) -> ! {
        SCB::sys_reset()
    }
}
