//! Software model of the NVMCTRL peripheral.
//!
//! [`EmulatedNvmctrl`] keeps the user page, the page buffer and the
//! SmartEEPROM contents in memory and follows the controller's rules closely
//! enough to exercise the driver on a host:
//!
//! - programming a quad word can only clear bits, erasing sets the whole page
//!   to `0xff`;
//! - the SmartEEPROM partition is latched from the user page at power on;
//!   changing it discards the stored data;
//! - buffered SmartEEPROM writes stay pending (`SEESTAT.LOAD`) until the
//!   virtual page is left, its last byte is written, or it is flushed;
//! - every command and every status poll can be made to take time.
//!
//! A system reset performs a power-on sequence and then unwinds with a
//! [`SystemReset`] payload. Use [`EmulatedNvmctrl::catch_reset`] to observe
//! it.

use std::panic::{self, AssertUnwindSafe};

use crate::{
    fuses::{Partition, SEE_FUSES_OFFSET},
    nvmctrl::{Command, Nvmctrl, SeeStatus, SeeWriteMode, USER_PAGE_ADDR, WriteMode},
    user_page::{QUAD_WORD_SIZE, USER_PAGE_SIZE},
};

const ERASE_BYTE: u8 = 0xff;

/// Size of the SmartEEPROM address window.
pub const SEEPROM_WINDOW_SIZE: usize = 64 * 1024;

/// Panic payload of [`EmulatedNvmctrl::system_reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemReset;

/// Register accesses with side effects, in the order they happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// `ADDR` was written.
    Address(u32),
    /// A command was issued through `CTRLB`.
    Command {
        /// The command.
        command: Command,
        /// Contents of `ADDR`.
        address: u32,
    },
    /// A quad word was loaded into the page buffer.
    PageBufferLoad {
        /// Offset into the user page.
        offset: usize,
    },
    /// `CTRLA.WMODE` was written.
    WriteMode(WriteMode),
    /// `SEECFG.WMODE` was written.
    SeeWriteMode(SeeWriteMode),
    /// A byte was written into the SmartEEPROM window.
    SeeWrite {
        /// Address within the window.
        address: usize,
        /// Written value.
        value: u8,
    },
    /// The system was reset.
    Reset,
}

/// Emulated NVM controller.
#[derive(Debug, Clone)]
pub struct EmulatedNvmctrl {
    user_page: [u8; USER_PAGE_SIZE],
    page_buffer: [u8; USER_PAGE_SIZE],
    address: u32,
    storage: Vec<u8>,
    partition: Partition,
    write_mode: WriteMode,
    see_write_mode: SeeWriteMode,
    locked: bool,
    pending_page: Option<usize>,
    latency: u32,
    not_ready_polls: u32,
    busy_polls: u32,
    flushes: usize,
    resets: usize,
    events: Vec<Event>,
}

impl Default for EmulatedNvmctrl {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulatedNvmctrl {
    /// A controller as shipped from the factory: SmartEEPROM disabled, the
    /// rest of the user page erased.
    pub fn new() -> Self {
        let mut user_page = [ERASE_BYTE; USER_PAGE_SIZE];
        user_page[SEE_FUSES_OFFSET] = Partition {
            page_size: 0,
            start_block: 0,
        }
        .apply(ERASE_BYTE);

        Self::with_user_page(user_page)
    }

    /// A controller booted with the given user page contents.
    pub fn with_user_page(user_page: [u8; USER_PAGE_SIZE]) -> Self {
        let mut nvm = Self {
            user_page,
            page_buffer: [ERASE_BYTE; USER_PAGE_SIZE],
            address: 0,
            storage: vec![ERASE_BYTE; SEEPROM_WINDOW_SIZE],
            partition: Partition::decode(user_page[SEE_FUSES_OFFSET]),
            write_mode: WriteMode::Manual,
            see_write_mode: SeeWriteMode::Unbuffered,
            locked: false,
            pending_page: None,
            latency: 0,
            not_ready_polls: 0,
            busy_polls: 0,
            flushes: 0,
            resets: 0,
            events: Vec::new(),
        };
        nvm.power_on();
        nvm
    }

    /// Writes `partition` into the fuses and power cycles, as if the device
    /// had been provisioned on an earlier boot.
    pub fn provision(&mut self, partition: Partition) {
        let fuses = partition.apply(self.user_page[SEE_FUSES_OFFSET]);
        self.user_page[SEE_FUSES_OFFSET] = fuses;
        self.power_on();
    }

    /// Sets or clears `SEESTAT.LOCK`. While locked, SmartEEPROM writes are
    /// ignored.
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    /// Number of status polls every command and SmartEEPROM write keeps the
    /// controller busy for.
    pub fn set_latency(&mut self, polls: u32) {
        self.latency = polls;
    }

    /// Runs the power-on sequence: latches the SmartEEPROM fuses and resets
    /// the volatile controller state.
    pub fn power_on(&mut self) {
        let partition = Partition::decode(self.user_page[SEE_FUSES_OFFSET]);
        if partition != self.partition {
            self.storage.fill(ERASE_BYTE);
        }
        self.partition = partition;
        self.write_mode = WriteMode::Manual;
        self.see_write_mode = SeeWriteMode::Unbuffered;
        self.pending_page = None;
        self.page_buffer.fill(ERASE_BYTE);
        self.address = 0;
        self.not_ready_polls = 0;
        self.busy_polls = 0;
    }

    /// Runs `f`, returning `Err(SystemReset)` if it reset the system.
    ///
    /// Panics other than a reset are propagated.
    pub fn catch_reset<R, F>(f: F) -> Result<R, SystemReset>
    where
        F: FnOnce() -> R,
    {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Ok(value),
            Err(payload) => match payload.downcast::<SystemReset>() {
                Ok(reset) => Err(*reset),
                Err(payload) => panic::resume_unwind(payload),
            },
        }
    }

    /// The current user page contents.
    pub fn user_page(&self) -> &[u8; USER_PAGE_SIZE] {
        &self.user_page
    }

    /// The partition latched at the last power on.
    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Current `CTRLA.WMODE`.
    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    /// Current `SEECFG.WMODE`.
    pub fn see_write_mode(&self) -> SeeWriteMode {
        self.see_write_mode
    }

    /// Number of times the page buffer was written to flash, explicitly or
    /// automatically.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Number of system resets.
    pub fn resets(&self) -> usize {
        self.resets
    }

    /// Every recorded event.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Forgets the recorded events.
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// The recorded commands with their `ADDR` value.
    pub fn commands(&self) -> impl Iterator<Item = (Command, u32)> + '_ {
        self.events.iter().filter_map(|event| match event {
            Event::Command { command, address } => Some((*command, *address)),
            _ => None,
        })
    }

    /// Number of bytes written into the SmartEEPROM window.
    pub fn see_writes(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, Event::SeeWrite { .. }))
            .count()
    }

    fn user_page_offset(address: u32) -> Option<usize> {
        let offset = address.checked_sub(USER_PAGE_ADDR)? as usize;
        (offset < USER_PAGE_SIZE).then_some(offset)
    }

    fn program_quad_word(&mut self, offset: usize) {
        let offset = offset - offset % QUAD_WORD_SIZE;
        for (cell, data) in self.user_page[offset..][..QUAD_WORD_SIZE]
            .iter_mut()
            .zip(&self.page_buffer[offset..][..QUAD_WORD_SIZE])
        {
            *cell &= *data;
        }
    }

    fn flush(&mut self) {
        if self.pending_page.take().is_some() {
            self.flushes += 1;
        }
    }
}

impl Nvmctrl for EmulatedNvmctrl {
    fn is_ready(&mut self) -> bool {
        if self.not_ready_polls > 0 {
            self.not_ready_polls -= 1;
            return false;
        }
        true
    }

    fn see_status(&mut self) -> SeeStatus {
        let mut bits = 0;
        if self.busy_polls > 0 {
            self.busy_polls -= 1;
            bits |= SeeStatus::BUSY;
        }
        if self.pending_page.is_some() {
            bits |= SeeStatus::LOAD;
        }
        if self.locked {
            bits |= SeeStatus::LOCK;
        }
        SeeStatus(bits).with_partition(self.partition.page_size, self.partition.start_block)
    }

    fn set_write_mode(&mut self, mode: WriteMode) {
        self.events.push(Event::WriteMode(mode));
        self.write_mode = mode;
    }

    fn set_see_write_mode(&mut self, mode: SeeWriteMode) {
        self.events.push(Event::SeeWriteMode(mode));
        if mode == SeeWriteMode::Unbuffered {
            self.flush();
        }
        self.see_write_mode = mode;
    }

    fn set_address(&mut self, address: u32) {
        self.events.push(Event::Address(address));
        self.address = address;
    }

    fn execute(&mut self, command: Command) {
        let address = self.address;
        self.events.push(Event::Command { command, address });
        self.not_ready_polls = self.latency;

        match command {
            Command::ErasePage => {
                if Self::user_page_offset(address).is_some() {
                    self.user_page.fill(ERASE_BYTE);
                }
            }
            Command::PageBufferClear => self.page_buffer.fill(ERASE_BYTE),
            Command::WriteQuadWord => {
                if let Some(offset) = Self::user_page_offset(address) {
                    self.program_quad_word(offset);
                }
            }
            Command::SmartEepromFlush => {
                self.flush();
                self.busy_polls = self.latency;
            }
        }
    }

    fn read_user_page(&mut self, page: &mut [u8; USER_PAGE_SIZE]) {
        page.copy_from_slice(&self.user_page);
    }

    fn load_page_buffer(&mut self, offset: usize, data: &[u8; QUAD_WORD_SIZE]) {
        self.events.push(Event::PageBufferLoad { offset });
        self.page_buffer[offset..][..QUAD_WORD_SIZE].copy_from_slice(data);

        if self.write_mode == WriteMode::AutoQuadWord {
            self.program_quad_word(offset);
        }
    }

    fn see_read(&mut self, address: usize) -> u8 {
        self.storage[address]
    }

    fn see_write(&mut self, address: usize, value: u8) {
        self.events.push(Event::SeeWrite { address, value });
        self.busy_polls = self.latency;
        if self.locked {
            return;
        }

        self.storage[address] = value;

        if self.see_write_mode == SeeWriteMode::Unbuffered {
            return;
        }

        let page_bytes = self.partition.page_bytes();
        let page = address / page_bytes;
        if self.pending_page.is_some_and(|pending| pending != page) {
            self.flush();
        }
        self.pending_page = Some(page);

        if address % page_bytes == page_bytes - 1 {
            self.flush();
        }
    }

    fn system_reset(&mut self) -> ! {
        self.events.push(Event::Reset);
        self.resets += 1;
        self.power_on();
        panic::panic_any(SystemReset)
    }
}
