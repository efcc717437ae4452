//! # SmartEEPROM driver for SAM D5x/E5x
//!
//! ## Overview
//!
//! The NVM controller of the SAM D5x/E5x family can reserve part of the main
//! flash to emulate a byte-addressable EEPROM, the SmartEEPROM. Its size is
//! selected by the `SEEPSZ` and `SEESBLK` fuses in the NVM user page, which
//! the controller only reads at power on.
//!
//! [`SmartEeprom::init`] compares those fuses with the configured capacity.
//! When they differ it rewrites the user page and resets the chip; on the
//! following boot the fuses match and the SmartEEPROM is ready. Every later
//! boot takes the matching path without touching the flash.
//!
//! ## Examples
//!
//! ```rust, no_run
//! use smart_eeprom::{Nvmctrl, SmartEeprom, Status};
//!
//! fn count_boot(nvm: impl Nvmctrl) -> Option<u32> {
//!     let mut eeprom = SmartEeprom::new(nvm);
//!     if eeprom.init() != Status::Ok {
//!         // Data in the SmartEEPROM cannot be relied upon.
//!         return None;
//!     }
//!
//!     let boots: u32 = eeprom.get(0);
//!     eeprom.put(0, &boots.wrapping_add(1));
//!     Some(boots)
//! }
//! ```
//!
//! ## Configuration
//!
//! The capacity comes from the `SMART_EEPROM_CONFIG_SIZE` environment
//! variable at build time (4096 bytes by default), see [`config`].
//!
//! ## Feature Flags
#![doc = document_features::document_features!(feature_label = r#"<span class="stab portability"><code>{feature}</code></span>"#)]
#![deny(missing_docs, rust_2018_idioms)]
#![cfg_attr(not(any(test, feature = "emulation")), no_std)]

// MUST be the first module
mod fmt;

pub mod config;
pub mod fuses;
pub mod nvmctrl;
pub mod user_page;

mod smart_eeprom;
mod storage;

#[cfg(feature = "samd51")]
mod hardware;

#[cfg(any(test, feature = "emulation"))]
mod emulation;

pub use config::{Config, EEPROM_EMULATION_SIZE};
#[cfg(any(test, feature = "emulation"))]
pub use emulation::{EmulatedNvmctrl, Event, SystemReset};
#[cfg(feature = "samd51")]
pub use hardware::Samd51Nvmctrl;
pub use nvmctrl::Nvmctrl;
pub use smart_eeprom::{SmartEeprom, Status};
pub use storage::SmartEepromError;

#[inline(always)]
fn maybe_with_critical_section<R>(f: impl FnOnce() -> R) -> R {
    #[cfg(feature = "critical-section")]
    {
        critical_section::with(|_| f())
    }

    #[cfg(not(feature = "critical-section"))]
    f()
}
