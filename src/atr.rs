//! ATR (Answer-to-Reset) parser, just enough to recognise Mifare Classic tags.
//!
//! Contactless cards don't have a real ATR; PC/SC readers synthesise one. For storage
//! cards (Mifare and friends) the format is fixed by PC/SC Part 3, Section 3.1.3.2.3:
//!
//!   3B 8F 80 01 80 4F 0C A0 00 00 03 06 SS NN NN 00 00 00 00 TCK
//!
//! where `A0 00 00 03 06` is the PC/SC RID, SS the standard and NN NN the card name.

use nom::bytes::complete::{tag, take};
use nom::combinator::{cond, map, opt};
use nom::number::complete::{be_u16, be_u8};
use num_enum::FromPrimitive;
use tracing::trace_span;

use crate::geometry::SizeClass;
use crate::{Error, Result};

pub type IResult<'a, T> = nom::IResult<&'a [u8], T>;

/// Registered application provider ID of the PC/SC workgroup.
pub const PCSC_RID: [u8; 5] = [0xA0, 0x00, 0x00, 0x03, 0x06];

/// Card names from the PC/SC Part 3 supplement. Only the Mifare ones matter here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u16)]
pub enum CardName {
    MifareClassic1K = 0x0001,
    MifareClassic4K = 0x0002,
    MifareUltralight = 0x0003,
    MifareMini = 0x0026,
    #[num_enum(catch_all)]
    Unknown(u16),
}

impl CardName {
    pub fn size_class(&self) -> Option<SizeClass> {
        match self {
            Self::MifareClassic1K => Some(SizeClass::OneK),
            Self::MifareClassic4K => Some(SizeClass::FourK),
            _ => None,
        }
    }
}

/// Interface byte TDn: protocol in the low nibble, presence of the next TA..TD in the high.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TDn {
    pub protocol: u8,
    pub next: u8,
}

impl From<u8> for TDn {
    fn from(v: u8) -> Self {
        Self {
            protocol: v & 0b0000_1111,
            next: (v & 0b1111_0000) >> 4,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TXn {
    pub ta: Option<u8>,
    pub tb: Option<u8>,
    pub tc: Option<u8>,
    pub td: Option<TDn>,
}

fn parse_txn(data: &[u8], present: u8) -> IResult<TXn> {
    let (data, ta) = cond(present & 1 << 0 > 0, be_u8)(data)?;
    let (data, tb) = cond(present & 1 << 1 > 0, be_u8)(data)?;
    let (data, tc) = cond(present & 1 << 2 > 0, be_u8)(data)?;
    let (data, td) = map(cond(present & 1 << 3 > 0, be_u8), |v| v.map(TDn::from))(data)?;
    Ok((data, TXn { ta, tb, tc, td }))
}

/// The application identifier block of a storage-card ATR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageCard {
    /// 0x03 = ISO 14443A part 3, which is where Mifare Classic lives.
    pub standard: u8,
    pub card_name: CardName,
}

fn parse_storage_card(data: &[u8]) -> IResult<StorageCard> {
    let (data, _) = tag(&[0x80u8, 0x4F][..])(data)?;
    let (data, len) = be_u8(data)?;
    let (data, aid) = take(len)(data)?;
    let (aid, _) = tag(&PCSC_RID[..])(aid)?;
    let (aid, standard) = be_u8(aid)?;
    let (_, card_name) = map(be_u16, CardName::from)(aid)?;
    Ok((
        data,
        StorageCard {
            standard,
            card_name,
        },
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ATR {
    pub ts: u8,
    /// Number of historical bytes.
    pub k: u8,
    pub interface: Vec<TXn>,
    pub historical_bytes: Vec<u8>,
    /// Set if the historical bytes describe a PC/SC storage card.
    pub storage_card: Option<StorageCard>,
    pub tck: Option<u8>,
}

impl ATR {
    pub fn card_name(&self) -> Option<CardName> {
        self.storage_card.map(|sc| sc.card_name)
    }

    /// Card size, if this is a Mifare Classic 1K or 4K.
    pub fn size_class(&self) -> Option<SizeClass> {
        self.card_name().and_then(|n| n.size_class())
    }
}

fn parse_atr(data: &[u8]) -> IResult<ATR> {
    let (data, ts) = be_u8(data)?;
    let (mut data, t0) = be_u8(data)?;
    let k = t0 & 0b0000_1111;

    let mut interface = Vec::new();
    let mut present = (t0 & 0b1111_0000) >> 4;
    while present != 0 {
        let (d, txn) = parse_txn(data, present)?;
        data = d;
        present = txn.td.map(|td| td.next).unwrap_or_default();
        interface.push(txn);
    }

    let (data, historical_bytes) = take(k)(data)?;
    let (data, tck) = opt(be_u8)(data)?;
    Ok((
        data,
        ATR {
            ts,
            k,
            interface,
            historical_bytes: historical_bytes.to_vec(),
            storage_card: parse_storage_card(historical_bytes).ok().map(|(_, sc)| sc),
            tck,
        },
    ))
}

pub fn parse(data: &[u8]) -> Result<ATR> {
    let span = trace_span!("parse_atr");
    let _enter = span.enter();

    parse_atr(data)
        .map(|(_, atr)| atr)
        .map_err(|err| Error::Atr(format!("{:02X?}: {}", data, err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mifare_1k() -> Result<()> {
        // ACR122U with a Mifare Classic 1K on it.
        let atr = parse(&[
            0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06, 0x03, 0x00,
            0x01, 0x00, 0x00, 0x00, 0x00, 0x6A,
        ])?;
        assert_eq!(atr.ts, 0x3B);
        assert_eq!(atr.k, 15);
        assert_eq!(
            atr.interface,
            vec![
                TXn {
                    td: Some(TDn {
                        protocol: 0,
                        next: 0b1000,
                    }),
                    ..TXn::default()
                },
                TXn {
                    td: Some(TDn {
                        protocol: 1,
                        next: 0,
                    }),
                    ..TXn::default()
                },
            ]
        );
        assert_eq!(
            atr.storage_card,
            Some(StorageCard {
                standard: 0x03,
                card_name: CardName::MifareClassic1K,
            })
        );
        assert_eq!(atr.size_class(), Some(SizeClass::OneK));
        assert_eq!(atr.tck, Some(0x6A));
        Ok(())
    }

    #[test]
    fn test_parse_mifare_4k() -> Result<()> {
        let atr = parse(&[
            0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06, 0x03, 0x00,
            0x02, 0x00, 0x00, 0x00, 0x00, 0x69,
        ])?;
        assert_eq!(atr.card_name(), Some(CardName::MifareClassic4K));
        assert_eq!(atr.size_class(), Some(SizeClass::FourK));
        Ok(())
    }

    #[test]
    fn test_parse_ultralight() -> Result<()> {
        let atr = parse(&[
            0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06, 0x03, 0x00,
            0x03, 0x00, 0x00, 0x00, 0x00, 0x68,
        ])?;
        assert_eq!(atr.card_name(), Some(CardName::MifareUltralight));
        assert_eq!(atr.size_class(), None);
        Ok(())
    }

    #[test]
    fn test_parse_contact_card() -> Result<()> {
        // A contact EMV card: valid ATR, but no storage card block.
        let atr = parse(&[
            0x3B, 0x8E, 0x80, 0x01, 0x80, 0x31, 0x80, 0x66, 0xB1, 0x84, 0x0C, 0x01, 0x6E, 0x01,
            0x83, 0x00, 0x90, 0x00, 0x1C,
        ])?;
        assert_eq!(atr.k, 14);
        assert_eq!(atr.storage_card, None);
        assert_eq!(atr.tck, Some(0x1C));
        Ok(())
    }

    #[test]
    fn test_parse_truncated() {
        match parse(&[0x3B, 0x8F, 0x80]).unwrap_err() {
            Error::Atr(_) => {}
            v => panic!("wrong error: {}", v),
        }
    }
}
