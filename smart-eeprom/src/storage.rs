use embedded_storage::{ReadStorage, Storage};

use crate::{
    nvmctrl::Nvmctrl,
    smart_eeprom::{SmartEeprom, Status},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// SmartEEPROM storage error.
pub enum SmartEepromError {
    /// Address or length out of bounds.
    OutOfBounds,
    /// [`SmartEeprom::init`] did not report a usable SmartEEPROM.
    NotReady,
    /// The SmartEEPROM section is write protected.
    Locked,
}

impl core::fmt::Display for SmartEepromError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfBounds => write!(f, "address or length out of bounds"),
            Self::NotReady => write!(f, "SmartEEPROM is not initialized"),
            Self::Locked => write!(f, "SmartEEPROM is locked"),
        }
    }
}

impl core::error::Error for SmartEepromError {}

impl<N> SmartEeprom<N>
where
    N: Nvmctrl,
{
    #[inline(always)]
    fn check_bounds(&self, offset: u32, length: usize) -> Result<(), SmartEepromError> {
        let offset = offset as usize;
        let capacity = self.length();
        if length > capacity || offset > capacity - length {
            return Err(SmartEepromError::OutOfBounds);
        }
        Ok(())
    }

    #[inline(always)]
    fn check_readable(&self) -> Result<(), SmartEepromError> {
        match self.status() {
            Status::Ok | Status::Locked => Ok(()),
            Status::NotConfigured | Status::ConfigError => Err(SmartEepromError::NotReady),
        }
    }
}

/// Bounds-checked access through `embedded-storage`.
///
/// Unlike the byte accessors, these require a successful
/// [`SmartEeprom::init`] first.
impl<N> ReadStorage for SmartEeprom<N>
where
    N: Nvmctrl,
{
    type Error = SmartEepromError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.check_readable()?;
        self.check_bounds(offset, bytes.len())?;

        for (address, byte) in (offset as usize..).zip(bytes.iter_mut()) {
            *byte = SmartEeprom::read(self, address);
        }

        Ok(())
    }

    fn capacity(&self) -> usize {
        self.length()
    }
}

impl<N> Storage for SmartEeprom<N>
where
    N: Nvmctrl,
{
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        self.check_readable()?;
        if self.status() == Status::Locked {
            return Err(SmartEepromError::Locked);
        }
        self.check_bounds(offset, bytes.len())?;

        for (address, byte) in (offset as usize..).zip(bytes.iter()) {
            self.update(address, *byte);
        }

        Ok(())
    }
}
