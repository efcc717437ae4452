//! Driver configuration.
//!
//! The emulated EEPROM capacity is chosen at build time through the
//! `SMART_EEPROM_CONFIG_SIZE` environment variable. The build script rejects
//! sizes the fuses cannot express.
#![doc = include_str!(concat!(env!("OUT_DIR"), "/smart_eeprom_config_table.md"))]

/// Emulated EEPROM capacity in bytes selected at build time.
pub const EEPROM_EMULATION_SIZE: usize =
    match usize::from_str_radix(env!("SMART_EEPROM_CONFIG_SIZE"), 10) {
        Ok(size) => size,
        Err(_) => ::core::panic!("SMART_EEPROM_CONFIG_SIZE is not a number"),
    };

/// SmartEEPROM driver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            size: EEPROM_EMULATION_SIZE,
        }
    }
}

impl Config {
    /// Requests a different emulated EEPROM capacity.
    ///
    /// Unlike the build-time setting this is not validated here; an
    /// unsupported size makes [`SmartEeprom::init`](crate::SmartEeprom::init)
    /// report [`Status::ConfigError`](crate::Status::ConfigError).
    pub const fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// The requested emulated EEPROM capacity in bytes.
    pub const fn size(&self) -> usize {
        self.size
    }
}
