//! Credentials: the fixed key profiles, and which one opens which sector.

use num_enum::IntoPrimitive;

use crate::sector::Role;
use crate::{Error, Result};

pub const KEY_LEN: usize = 6;

/// Well-known Mifare keys. These are fixed protocol data, not secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyProfile {
    /// Factory default on blank cards.
    Transport,
    /// Public MAD key (MAD sectors of NDEF-formatted tags).
    Mad,
    /// Public NDEF key (data sectors of NDEF-formatted tags).
    NdefRead,
}

impl KeyProfile {
    pub fn bytes(&self) -> [u8; KEY_LEN] {
        match self {
            Self::Transport => [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
            Self::Mad => [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5],
            Self::NdefRead => [0xD3, 0xF7, 0xD3, 0xF7, 0xD3, 0xF7],
        }
    }
}

/// Which of the sector's two keys to authenticate against.
/// The discriminant is the Mifare authentication command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum KeySlot {
    A = 0x60,
    B = 0x61,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key {
    pub bytes: [u8; KEY_LEN],
    pub slot: KeySlot,
}

/// Decodes a hex key, eg. "d3f7d3f7d3f7". `name` is only used in errors.
pub fn parse_key(name: &'static str, s: &str) -> Result<[u8; KEY_LEN]> {
    let raw = hex::decode(s.trim()).map_err(|source| Error::KeyHex { name, source })?;
    raw.as_slice().try_into().map_err(|_| Error::KeyFormat {
        name,
        len: raw.len(),
    })
}

/// What an operation is doing; decides which key a role gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Format,
    Read,
    Write,
    Dump,
}

/// The three keys an operation can need, plus the slot they're all used with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTable {
    pub transport: [u8; KEY_LEN],
    pub mad: [u8; KEY_LEN],
    pub ndef: [u8; KEY_LEN],
    pub slot: KeySlot,
}

impl Default for KeyTable {
    fn default() -> Self {
        Self {
            transport: KeyProfile::Transport.bytes(),
            mad: KeyProfile::Mad.bytes(),
            ndef: KeyProfile::NdefRead.bytes(),
            slot: KeySlot::A,
        }
    }
}

impl KeyTable {
    pub fn with_slot(mut self, slot: KeySlot) -> Self {
        self.slot = slot;
        self
    }

    /// Picks the key for a sector. Slot B reuses the same bytes as slot A; the slot only
    /// changes which authentication command is sent.
    pub fn select(&self, mode: Mode, role: Role) -> Key {
        let bytes = match (mode, role) {
            (Mode::Format, _) => self.transport,
            (Mode::Read | Mode::Write, Role::Mad) => self.mad,
            (Mode::Read | Mode::Write, _) => self.ndef,
            (Mode::Dump, r) if r.is_mad() => self.mad,
            (Mode::Dump, _) => self.ndef,
        };
        Key {
            bytes,
            slot: self.slot,
        }
    }
}
