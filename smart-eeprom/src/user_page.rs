//! Local mirror of the NVM user page.

use crate::{fuses::SEE_FUSES_OFFSET, nvmctrl::Nvmctrl};

/// Size of the NVM user page in bytes.
pub const USER_PAGE_SIZE: usize = 512;

/// Programming granularity of the user page in bytes.
pub const QUAD_WORD_SIZE: usize = 16;

/// A copy of the user page, read from and written back to the controller.
#[derive(Clone, PartialEq, Eq)]
pub struct UserPage {
    bytes: [u8; USER_PAGE_SIZE],
}

impl UserPage {
    /// Reads the whole user page from the controller.
    pub fn read<N: Nvmctrl>(nvm: &mut N) -> Self {
        let mut bytes = [0u8; USER_PAGE_SIZE];
        nvm.read_user_page(&mut bytes);
        Self { bytes }
    }

    /// Wraps an existing page image.
    pub const fn from_bytes(bytes: [u8; USER_PAGE_SIZE]) -> Self {
        Self { bytes }
    }

    /// The raw page image.
    pub fn as_bytes(&self) -> &[u8; USER_PAGE_SIZE] {
        &self.bytes
    }

    /// The packed SmartEEPROM fuse byte.
    pub fn see_fuses(&self) -> u8 {
        self.bytes[SEE_FUSES_OFFSET]
    }

    /// Replaces the packed SmartEEPROM fuse byte.
    pub fn set_see_fuses(&mut self, fuses: u8) {
        self.bytes[SEE_FUSES_OFFSET] = fuses;
    }

    /// Iterates over the quad words covering the first `len` bytes, together
    /// with their offset into the page.
    ///
    /// A partial trailing quad word is included whole.
    pub fn quad_words(&self, len: usize) -> impl Iterator<Item = (usize, &[u8; QUAD_WORD_SIZE])> {
        let count = len.min(USER_PAGE_SIZE).div_ceil(QUAD_WORD_SIZE);
        (0..count).filter_map(move |index| {
            let offset = index * QUAD_WORD_SIZE;
            self.bytes[offset..]
                .first_chunk::<QUAD_WORD_SIZE>()
                .map(|chunk| (offset, chunk))
        })
    }
}

impl core::fmt::Debug for UserPage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserPage")
            .field("see_fuses", &format_args!("{:#04x}", self.see_fuses()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequential() -> UserPage {
        let mut bytes = [0u8; USER_PAGE_SIZE];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = i as u8;
        }
        UserPage::from_bytes(bytes)
    }

    #[test]
    fn fuse_byte_lives_at_offset_four() {
        let mut page = sequential();
        assert_eq!(page.see_fuses(), 4);

        page.set_see_fuses(0xb1);
        assert_eq!(page.as_bytes()[4], 0xb1);
        assert_eq!(page.as_bytes()[3], 3);
        assert_eq!(page.as_bytes()[5], 5);
    }

    #[test]
    fn quad_words_through_fuse_byte() {
        let page = sequential();
        let words: Vec<_> = page.quad_words(SEE_FUSES_OFFSET + 1).collect();

        assert_eq!(words.len(), 1);
        assert_eq!(words[0].0, 0);
        assert_eq!(words[0].1[15], 15);
    }

    #[test]
    fn quad_words_whole_page() {
        let page = sequential();
        let offsets: Vec<_> = page
            .quad_words(USER_PAGE_SIZE)
            .map(|(offset, _)| offset)
            .collect();

        assert_eq!(offsets.len(), USER_PAGE_SIZE / QUAD_WORD_SIZE);
        assert_eq!(offsets.first(), Some(&0));
        assert_eq!(offsets.last(), Some(&(USER_PAGE_SIZE - QUAD_WORD_SIZE)));
    }

    #[test]
    fn quad_words_round_up() {
        let page = sequential();
        assert_eq!(page.quad_words(17).count(), 2);
        assert_eq!(page.quad_words(0).count(), 0);
        assert_eq!(page.quad_words(10_000).count(), 32);
    }
}
