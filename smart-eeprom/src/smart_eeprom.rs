use bytemuck::{NoUninit, Pod};

use crate::{
    config::Config,
    fmt::Bytes,
    fuses::{Partition, Transition},
    maybe_with_critical_section,
    nvmctrl::{Command, Nvmctrl, SeeWriteMode, USER_PAGE_ADDR, WriteMode},
    user_page::UserPage,
};

/// SmartEEPROM state as determined by [`SmartEeprom::init`].
///
/// The discriminants are the numeric status codes exposed to firmware and
/// stay stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Status {
    /// [`SmartEeprom::init`] has not been called yet.
    NotConfigured = 0,
    /// The fuses match the requested capacity and the SmartEEPROM is usable.
    Ok = 1,
    /// The requested capacity cannot be expressed by the fuses.
    ConfigError = 2,
    /// The SmartEEPROM section is locked. Stored data can still be read.
    Locked = 3,
}

/// SmartEEPROM driver.
///
/// Created from anything implementing [`Nvmctrl`], including `&mut` to one,
/// so the controller can be reused after the driver is dropped.
///
/// All byte accessors take an address relative to the start of the
/// SmartEEPROM window. Addresses must be below [`SmartEeprom::length`]; the
/// byte accessors do not check this.
#[derive(Debug)]
pub struct SmartEeprom<N> {
    nvm: N,
    config: Config,
    status: Status,
}

impl<N> SmartEeprom<N>
where
    N: Nvmctrl,
{
    /// Creates a driver for the capacity selected at build time.
    pub fn new(nvm: N) -> Self {
        Self::with_config(nvm, Config::default())
    }

    /// Creates a driver with an explicit configuration.
    pub fn with_config(nvm: N, config: Config) -> Self {
        Self {
            nvm,
            config,
            status: Status::NotConfigured,
        }
    }

    /// Checks the SmartEEPROM fuses and prepares the SmartEEPROM for use.
    ///
    /// If the fuses do not describe the configured capacity they are
    /// reprogrammed and the system is reset, so that the controller picks
    /// them up. In that case this function does not return; the next boot
    /// finds matching fuses and returns [`Status::Ok`].
    ///
    /// [`Status::Locked`] takes precedence over every other outcome.
    pub fn init(&mut self) -> Status {
        self.status = self.check_fuses(self.config.size());

        if self.is_locked() {
            warn!("SmartEEPROM section is locked");
            self.status = Status::Locked;
        }

        self.nvm.set_see_write_mode(SeeWriteMode::Buffered);

        self.status
    }

    fn check_fuses(&mut self, size: usize) -> Status {
        let page = UserPage::read(&mut self.nvm);

        let Some(partition) = Partition::for_capacity(size) else {
            warn!("No SmartEEPROM layout provides {} bytes", size);
            return Status::ConfigError;
        };

        let current = page.see_fuses();
        let fuses = partition.apply(current);
        if fuses == current {
            debug!("SmartEEPROM fuses already set for {} bytes", size);
            return Status::Ok;
        }

        self.reconfigure(page, fuses)
    }

    /// Programs `fuses` into the user page and resets.
    fn reconfigure(&mut self, mut page: UserPage, fuses: u8) -> ! {
        let transition = Transition::classify(page.see_fuses(), fuses);
        debug!(
            "Rewriting SmartEEPROM fuses {:#x} -> {:#x} ({:?})",
            page.see_fuses(),
            fuses,
            transition
        );

        maybe_with_critical_section(|| {
            while !self.nvm.is_ready() {}

            self.nvm.set_write_mode(WriteMode::Manual);

            if transition == Transition::Format {
                self.execute_and_wait(Command::ErasePage, USER_PAGE_ADDR);
            }
            self.execute_and_wait(Command::PageBufferClear, USER_PAGE_ADDR);

            page.set_see_fuses(fuses);

            for (offset, quad_word) in page.quad_words(transition.rewrite_len()) {
                trace!("Writing user page offset {}: {:?}", offset, Bytes(quad_word));
                self.nvm.load_page_buffer(offset, quad_word);
                self.execute_and_wait(Command::WriteQuadWord, USER_PAGE_ADDR + offset as u32);
            }
        });

        info!("SmartEEPROM fuses updated, resetting");
        self.nvm.system_reset()
    }

    fn execute_and_wait(&mut self, command: Command, address: u32) {
        self.nvm.set_address(address);
        self.nvm.execute(command);
        while !self.nvm.is_ready() {}
    }

    /// The status determined by the last call to [`SmartEeprom::init`].
    pub fn status(&self) -> Status {
        self.status
    }

    /// Reads the byte at `address`.
    pub fn read(&mut self, address: usize) -> u8 {
        self.wait_busy();
        self.nvm.see_read(address)
    }

    /// Stores `value` at `address` if it differs from the stored byte.
    ///
    /// The page buffer is flushed right away unless the controller still
    /// holds buffered data, which it writes out by itself once the page is
    /// left or filled.
    pub fn update(&mut self, address: usize, value: u8) {
        maybe_with_critical_section(|| {
            self.wait_busy();
            if self.nvm.see_read(address) == value {
                return;
            }

            self.nvm.see_write(address, value);
            if !self.is_dirty() {
                self.commit();
            }
        })
    }

    /// Same as [`SmartEeprom::update`].
    pub fn write(&mut self, address: usize, value: u8) {
        self.update(address, value)
    }

    /// Reads a `T` stored byte by byte starting at `address`.
    pub fn get<T: Pod>(&mut self, address: usize) -> T {
        let mut value = T::zeroed();
        for (offset, byte) in bytemuck::bytes_of_mut(&mut value).iter_mut().enumerate() {
            *byte = self.read(address + offset);
        }
        value
    }

    /// Stores `value` byte by byte starting at `address`, skipping bytes that
    /// are already up to date.
    pub fn put<'v, T: NoUninit>(&mut self, address: usize, value: &'v T) -> &'v T {
        for (offset, byte) in bytemuck::bytes_of(value).iter().enumerate() {
            self.update(address + offset, *byte);
        }
        value
    }

    /// Whether the SmartEEPROM is busy.
    pub fn is_busy(&mut self) -> bool {
        self.nvm.see_status().busy()
    }

    /// Whether the page buffer holds data not yet written to flash.
    pub fn is_dirty(&mut self) -> bool {
        self.nvm.see_status().load()
    }

    /// Whether the SmartEEPROM section is write protected.
    pub fn is_locked(&mut self) -> bool {
        self.nvm.see_status().lock()
    }

    /// Spins until the SmartEEPROM is no longer busy.
    pub fn wait_busy(&mut self) {
        while self.is_busy() {}
    }

    /// Flushes the SmartEEPROM page buffer to flash.
    pub fn commit(&mut self) {
        maybe_with_critical_section(|| self.nvm.execute(Command::SmartEepromFlush))
    }

    /// Emulated EEPROM capacity in bytes, as configured.
    pub fn length(&self) -> usize {
        self.config.size()
    }

    /// The partition the controller latched at power on.
    pub fn active_partition(&mut self) -> Partition {
        let status = self.nvm.see_status();
        Partition {
            page_size: status.psz(),
            start_block: status.sblk(),
        }
    }

    /// Capacity of the partition the controller latched at power on.
    ///
    /// This can differ from [`SmartEeprom::length`] until `init` has
    /// reprogrammed the fuses and the system has been reset. `None` means the
    /// latched fuses are not a known layout.
    pub fn hardware_capacity(&mut self) -> Option<usize> {
        self.active_partition().capacity()
    }

    /// Releases the controller.
    pub fn free(self) -> N {
        self.nvm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EmulatedNvmctrl, emulation::Event};

    fn provisioned(size: usize) -> EmulatedNvmctrl {
        let mut nvm = EmulatedNvmctrl::new();
        nvm.provision(Partition::for_capacity(size).unwrap());
        nvm
    }

    fn ready(nvm: &mut EmulatedNvmctrl, size: usize) -> SmartEeprom<&mut EmulatedNvmctrl> {
        let mut eeprom = SmartEeprom::with_config(nvm, Config::default().with_size(size));
        assert_eq!(eeprom.init(), Status::Ok);
        eeprom
    }

    #[test]
    fn status_codes_are_stable() {
        assert_eq!(Status::NotConfigured as u8, 0);
        assert_eq!(Status::Ok as u8, 1);
        assert_eq!(Status::ConfigError as u8, 2);
        assert_eq!(Status::Locked as u8, 3);
    }

    #[test]
    fn status_before_init() {
        let mut nvm = provisioned(512);
        let eeprom = SmartEeprom::new(&mut nvm);
        assert_eq!(eeprom.status(), Status::NotConfigured);
    }

    #[test]
    fn round_trip_every_address() {
        let mut nvm = provisioned(2048);
        let mut eeprom = ready(&mut nvm, 2048);

        for address in 0..eeprom.length() {
            eeprom.write(address, (address * 7) as u8);
        }
        for address in 0..eeprom.length() {
            assert_eq!(eeprom.read(address), (address * 7) as u8, "address {address}");
        }
    }

    #[test]
    fn update_skips_identical_bytes() {
        let mut nvm = provisioned(512);
        let mut eeprom = ready(&mut nvm, 512);
        eeprom.update(10, 0x5a);
        eeprom.commit();
        let nvm = eeprom.free();
        nvm.clear_events();

        let mut eeprom = SmartEeprom::with_config(&mut *nvm, Config::default().with_size(512));
        eeprom.update(10, 0x5a);
        eeprom.write(10, 0x5a);

        assert_eq!(nvm.see_writes(), 0);
        assert_eq!(nvm.commands().count(), 0);
    }

    #[test]
    fn update_commits_when_nothing_is_buffered() {
        let mut nvm = provisioned(512);
        let mut eeprom = ready(&mut nvm, 512);

        // Last byte of a 4 byte page: the controller flushes by itself and
        // LOAD is clear afterwards.
        eeprom.update(3, 1);

        let nvm = eeprom.free();
        assert_eq!(nvm.commands().last(), Some((Command::SmartEepromFlush, 0)));
    }

    #[test]
    fn update_leaves_partial_page_to_the_controller() {
        let mut nvm = provisioned(512);
        let mut eeprom = ready(&mut nvm, 512);

        eeprom.update(0, 1);
        eeprom.update(1, 2);
        assert!(eeprom.is_dirty());

        let nvm = eeprom.free();
        assert_eq!(nvm.commands().count(), 0);
        assert_eq!(nvm.see_writes(), 2);
    }

    #[test]
    fn commit_flushes_pending_data() {
        let mut nvm = provisioned(512);
        let mut eeprom = ready(&mut nvm, 512);

        eeprom.update(0, 1);
        assert!(eeprom.is_dirty());
        eeprom.commit();
        assert!(!eeprom.is_dirty());
    }

    #[test]
    fn commit_leaves_address_register_alone() {
        let mut nvm = provisioned(512);
        let mut eeprom = ready(&mut nvm, 512);
        eeprom.update(0, 1);

        let nvm = eeprom.free();
        nvm.clear_events();
        SmartEeprom::with_config(&mut *nvm, Config::default().with_size(512)).commit();

        assert_eq!(
            nvm.events(),
            [Event::Command {
                command: Command::SmartEepromFlush,
                address: 0
            }]
        );
    }

    #[test]
    fn accesses_wait_for_busy() {
        let mut nvm = provisioned(512);
        nvm.set_latency(3);
        let mut eeprom = ready(&mut nvm, 512);

        eeprom.update(0, 9);
        // `update` returned, and the next access polled BUSY away.
        assert_eq!(eeprom.read(0), 9);
        assert!(!eeprom.is_busy());
    }

    #[test]
    fn get_and_put_typed_values() {
        let mut nvm = provisioned(1024);
        let mut eeprom = ready(&mut nvm, 1024);

        let value: u32 = 0xdead_beef;
        assert_eq!(*eeprom.put(100, &value), value);
        assert_eq!(eeprom.get::<u32>(100), value);
        assert_eq!(eeprom.read(100), value.to_ne_bytes()[0]);
        assert_eq!(eeprom.read(103), value.to_ne_bytes()[3]);

        let samples: [i16; 4] = [-1, 2, -300, 4000];
        eeprom.put(200, &samples);
        assert_eq!(eeprom.get::<[i16; 4]>(200), samples);
    }

    #[test]
    fn put_only_writes_changed_bytes() {
        let mut nvm = provisioned(1024);
        let mut eeprom = ready(&mut nvm, 1024);
        eeprom.put(0, &[0x11u8, 0x22, 0x33, 0x44]);

        let nvm = eeprom.free();
        nvm.clear_events();
        let mut eeprom = SmartEeprom::with_config(&mut *nvm, Config::default().with_size(1024));
        eeprom.put(0, &[0x11u8, 0x22, 0x33, 0xff]);

        assert_eq!(
            nvm.events()
                .iter()
                .filter(|event| matches!(event, Event::SeeWrite { .. }))
                .collect::<Vec<_>>(),
            [&Event::SeeWrite {
                address: 3,
                value: 0xff
            }]
        );
    }

    #[test]
    fn init_selects_buffered_mode() {
        let mut nvm = provisioned(512);
        let eeprom = ready(&mut nvm, 512);

        let nvm = eeprom.free();
        assert_eq!(nvm.see_write_mode(), SeeWriteMode::Buffered);
    }

    #[test]
    fn length_follows_configuration() {
        let mut nvm = provisioned(512);
        let eeprom = SmartEeprom::with_config(&mut nvm, Config::default().with_size(16384));
        assert_eq!(eeprom.length(), 16384);
    }

    #[test]
    fn hardware_capacity_reports_latched_layout() {
        let mut nvm = provisioned(8192);
        let mut eeprom = SmartEeprom::with_config(&mut nvm, Config::default().with_size(512));

        assert_eq!(
            eeprom.active_partition(),
            Partition {
                page_size: 4,
                start_block: 2
            }
        );
        assert_eq!(eeprom.hardware_capacity(), Some(8192));
        assert_ne!(eeprom.hardware_capacity(), Some(eeprom.length()));
    }
}
