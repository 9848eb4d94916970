//! NDEF formatting, reading, writing and dumping for Mifare Classic 1K/4K tags.
//!
//! The interesting part lives in [`sector`], [`keys`] and [`access`]: which index plays
//! which role, which key opens it, and how a whole-tag operation is sequenced and aborted.
//! Everything that actually talks to a reader sits behind [`access::CardAccess`].

pub mod access;
pub mod atr;
pub mod geometry;
pub mod keys;
pub mod layout;
pub mod ops;
pub mod reader;
pub mod sector;

#[cfg(test)]
pub(crate) mod testing;

use std::path::PathBuf;

pub use access::{Attempts, CardAccess, Poll, Session};
pub use geometry::{CardGeometry, SizeClass};
pub use keys::{Key, KeyProfile, KeySlot, KeyTable, Mode};
pub use layout::LayoutConstant;
pub use ops::{Operation, PayloadSource};
pub use sector::{Role, SectorDescriptor};

/// A single 16-byte card block, the unit of every transfer.
pub type Block = [u8; BLOCK_SIZE];

pub const BLOCK_SIZE: usize = 16;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("card reader unavailable: {0}")]
    ReaderUnavailable(String),

    #[error("{name} key must decode to exactly 6 bytes, got {len}")]
    KeyFormat { name: &'static str, len: usize },

    #[error("invalid hex in {name} key: {source}")]
    KeyHex {
        name: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    #[error("authentication failed for sector {index} with key {slot:?}")]
    Authentication {
        index: u8,
        slot: KeySlot,
        #[source]
        source: Box<Error>,
    },

    #[error("{op} failed for sector {index}")]
    Transfer {
        index: u8,
        op: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("couldn't read payload {}: {source}", path.display())]
    PayloadSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no compatible card after {attempts} attempts")]
    NoCard { attempts: u32 },

    #[error("APDU error: {0:02X} {1:02X}")]
    APDU(u8, u8),

    #[error("malformed response: {0}")]
    Response(&'static str),

    #[error("couldn't parse ATR: {0}")]
    Atr(String),

    #[error(transparent)]
    IO(#[from] std::io::Error),

    #[error(transparent)]
    PCSC(#[from] ::pcsc::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
