//! Card geometry: how many sector indices a tag exposes and how big each sector is.
//!
//! Indices address blocks the way the reader does: 0..128 are the four-block sectors,
//! 128..256 (4K only) the sixteen-block ones.

use crate::sector::{classify, Role};
use crate::BLOCK_SIZE;

/// Index where the classifier switches from 4-block to 16-block trailer spacing.
/// This is fixed by the Mifare layout and doesn't depend on the card size.
pub const HIGH_REGION_START: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    OneK,
    FourK,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardGeometry {
    pub size_class: SizeClass,
    /// Number of addressable indices.
    pub sector_count: usize,
    /// First physical sector with 16 blocks.
    pub low_sector_boundary: usize,
}

impl CardGeometry {
    pub fn new(size_class: SizeClass) -> Self {
        match size_class {
            SizeClass::OneK => Self {
                size_class,
                sector_count: 16 * 4,
                low_sector_boundary: 16,
            },
            SizeClass::FourK => Self {
                size_class,
                sector_count: (4 * 32) + (8 * 16),
                low_sector_boundary: 32,
            },
        }
    }

    pub fn is_four_k(&self) -> bool {
        self.size_class == SizeClass::FourK
    }

    /// Number of physical sectors on the card.
    pub fn physical_sectors(&self) -> usize {
        match self.size_class {
            SizeClass::OneK => 16,
            SizeClass::FourK => 40,
        }
    }

    /// Physical sector holding the given index.
    pub fn physical_sector(&self, index: u8) -> usize {
        if index < HIGH_REGION_START {
            index as usize / 4
        } else {
            32 + (index - HIGH_REGION_START) as usize / 16
        }
    }

    pub fn blocks_in_sector(&self, physical: usize) -> usize {
        if physical < self.low_sector_boundary {
            4
        } else {
            16
        }
    }

    /// Iterates over every valid index.
    pub fn indices(&self) -> impl Iterator<Item = u8> {
        // sector_count never exceeds 256, so every index fits in a u8.
        (0..self.sector_count).map(|i| i as u8)
    }

    /// Bytes a Read/Write can move, i.e. one block per Data index.
    pub fn data_capacity(&self, ignore_second_mad: bool) -> usize {
        self.indices()
            .filter(|&i| classify(i, self, ignore_second_mad) == Role::Data)
            .count()
            * BLOCK_SIZE
    }
}

impl From<SizeClass> for CardGeometry {
    fn from(v: SizeClass) -> Self {
        Self::new(v)
    }
}
