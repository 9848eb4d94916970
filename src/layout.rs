//! Fixed blocks written by Format.

use crate::Block;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutConstant {
    /// First MAD block: CRC + info byte, then NDEF AIDs (03 E1) for every sector.
    MadData,
    /// Remaining MAD blocks, all NDEF AIDs.
    MadData2,
    /// MAD sector trailer: MAD key as key A, read-only access bits, GPB C1, MAD key as B.
    MadTrailer,
    /// Data sector trailer: NDEF key as A and B, read/write access bits, GPB 40.
    NdefTrailer,
}

impl LayoutConstant {
    pub fn block(&self) -> Block {
        match self {
            Self::MadData => [
                0x00, 0x01, 0x03, 0xE1, 0x03, 0xE1, 0x03, 0xE1, 0x03, 0xE1, 0x03, 0xE1, 0x03,
                0xE1, 0x03, 0xE1,
            ],
            Self::MadData2 => [
                0x03, 0xE1, 0x03, 0xE1, 0x03, 0xE1, 0x03, 0xE1, 0x03, 0xE1, 0x03, 0xE1, 0x03,
                0xE1, 0x03, 0xE1,
            ],
            Self::MadTrailer => [
                0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0x78, 0x77, 0x88, 0xC1, 0xA0, 0xA1, 0xA2,
                0xA3, 0xA4, 0xA5,
            ],
            Self::NdefTrailer => [
                0xD3, 0xF7, 0xD3, 0xF7, 0xD3, 0xF7, 0x7F, 0x07, 0x88, 0x40, 0xD3, 0xF7, 0xD3,
                0xF7, 0xD3, 0xF7,
            ],
        }
    }

    /// Which MAD block belongs at a MAD index, if any. Block 0 is the manufacturer block
    /// and is never written.
    pub fn for_mad_index(index: u8) -> Option<Self> {
        match index {
            1 | 64 => Some(Self::MadData),
            2 | 65 | 66 => Some(Self::MadData2),
            3 | 67 => Some(Self::MadTrailer),
            _ => None,
        }
    }
}
