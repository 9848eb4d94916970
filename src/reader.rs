//! [`CardAccess`] over a PC/SC contactless reader.
//!
//! Mifare Classic isn't ISO 7816-4, so this speaks the PC/SC Part 3 storage-card
//! pseudo-APDUs (CLA 0xFF) that ACR122U-class readers translate into Mifare commands.
//! The key is always loaded into volatile slot 0 right before authenticating.

use std::ffi::CString;

use pcsc::{Context, Protocols, Scope, ShareMode};
use tracing::{debug, trace, trace_span, warn};

use crate::access::CardAccess;
use crate::atr;
use crate::geometry::SizeClass;
use crate::keys::Key;
use crate::{Block, Error, Result, BLOCK_SIZE};

/// Volatile key slot in the reader.
const KEY_SLOT: u8 = 0x00;

pub struct PcscReader {
    ctx: Context,
    name: CString,
    card: Option<pcsc::Card>,
    expected: SizeClass,
}

/// Lists the names of all connected readers.
pub fn list_readers() -> Result<Vec<String>> {
    let span = trace_span!("list_readers");
    let _enter = span.enter();

    let ctx = Context::establish(Scope::User)?;
    let mut readers_buf = [0; 2048];
    Ok(ctx
        .list_readers(&mut readers_buf)?
        .map(|name| name.to_string_lossy().into_owned())
        .collect())
}

impl PcscReader {
    /// Connects to PC/SC and picks a reader: the named one, or else the first one found.
    /// `expected` is only used to warn when the card on the reader is a different size.
    pub fn open(name: Option<&str>, expected: SizeClass) -> Result<Self> {
        let span = trace_span!("open_reader", name);
        let _enter = span.enter();

        let ctx = Context::establish(Scope::User)
            .map_err(|err| Error::ReaderUnavailable(format!("no PC/SC context: {}", err)))?;
        let name = if let Some(name) = name {
            debug!(name, "Using named reader");
            CString::new(name).map_err(|_| Error::ReaderUnavailable(name.into()))?
        } else {
            let mut readers_buf = [0; 2048];
            debug!("Listing available readers");
            let name = ctx
                .list_readers(&mut readers_buf)
                .map_err(|err| Error::ReaderUnavailable(err.to_string()))?
                .next()
                .ok_or_else(|| Error::ReaderUnavailable("no supported reader connected".into()))?
                .to_owned();
            debug!(?name, "Using first available reader");
            name
        };

        Ok(Self {
            ctx,
            name,
            card: None,
            expected,
        })
    }

    fn card(&self) -> Result<&pcsc::Card> {
        self.card
            .as_ref()
            .ok_or_else(|| Error::ReaderUnavailable("no card connected".into()))
    }

    fn call(&self, cmd: apdu::Command) -> Result<Vec<u8>> {
        let mut wbuf = [0; pcsc::MAX_BUFFER_SIZE];
        let mut rbuf = [0; pcsc::MAX_BUFFER_SIZE];
        let req = encode(&cmd, &mut wbuf);
        trace!(?req, ">> TX");

        let rsp = self.card()?.transmit(req, &mut rbuf)?;
        trace!(?rsp, "<< RX");
        split_status(rsp).map(|data| data.to_vec())
    }
}

fn encode<'a>(cmd: &apdu::Command, wbuf: &'a mut [u8]) -> &'a [u8] {
    cmd.write(wbuf);
    &wbuf[..cmd.len()]
}

/// Strips SW1 SW2 off a response, failing unless they're 90 00.
fn split_status(rsp: &[u8]) -> Result<&[u8]> {
    match rsp {
        [data @ .., 0x90, 0x00] => Ok(data),
        [.., sw1, sw2] => Err(Error::APDU(*sw1, *sw2)),
        _ => Err(Error::Response("no status word")),
    }
}

/// Errors meaning the card left (or never reached) the field keep the poll going;
/// anything else means the reader is gone.
fn absent_or_fatal(err: pcsc::Error) -> Result<bool> {
    match err {
        pcsc::Error::NoSmartcard
        | pcsc::Error::RemovedCard
        | pcsc::Error::ResetCard
        | pcsc::Error::UnpoweredCard
        | pcsc::Error::UnresponsiveCard => {
            debug!(%err, "No card in the field");
            Ok(false)
        }
        err => Err(Error::ReaderUnavailable(err.to_string())),
    }
}

impl CardAccess for PcscReader {
    fn init_layer2(&mut self) -> Result<bool> {
        self.card = None;
        match self
            .ctx
            .connect(&self.name, ShareMode::Shared, Protocols::ANY)
        {
            Ok(card) => {
                self.card = Some(card);
                Ok(true)
            }
            Err(err) => absent_or_fatal(err),
        }
    }

    fn init_layer3(&mut self) -> Result<bool> {
        let mut buf = [0; pcsc::MAX_ATR_SIZE];
        let raw = match self
            .card()?
            .get_attribute(pcsc::Attribute::AtrString, &mut buf)
        {
            Ok(raw) => raw,
            Err(err) => return absent_or_fatal(err),
        };
        debug!(atr = format!("{:02X?}", raw), "Raw ATR");

        let atr = match atr::parse(raw) {
            Ok(atr) => atr,
            Err(err) => {
                warn!(%err, "Unrecognised card");
                return Ok(false);
            }
        };
        match atr.size_class() {
            Some(size) => {
                if size != self.expected {
                    warn!(card = ?size, selected = ?self.expected, "Card size doesn't match");
                }
                Ok(true)
            }
            None => {
                warn!(name = ?atr.card_name(), "Not a Mifare Classic card");
                Ok(false)
            }
        }
    }

    fn authenticate(&mut self, index: u8, key: &Key) -> Result<()> {
        self.call(apdu::Command::new_with_payload(
            0xFF,
            0x82,
            0x00,
            KEY_SLOT,
            &key.bytes[..],
        ))?;
        self.call(apdu::Command::new_with_payload(
            0xFF,
            0x86,
            0x00,
            0x00,
            &[0x01, 0x00, index, key.slot.into(), KEY_SLOT][..],
        ))?;
        debug!(index, "Mifare auth succeeded");
        Ok(())
    }

    fn read_block(&mut self, index: u8) -> Result<Block> {
        let data = self.call(apdu::Command::new_with_le(
            0xFF,
            0xB0,
            0x00,
            index,
            BLOCK_SIZE as u16,
        ))?;
        data.as_slice()
            .try_into()
            .map_err(|_| Error::Response("short block"))
    }

    fn write_block(&mut self, index: u8, data: &Block) -> Result<()> {
        self.call(apdu::Command::new_with_payload(
            0xFF,
            0xD6,
            0x00,
            index,
            &data[..],
        ))?;
        Ok(())
    }

    fn uid(&mut self) -> Result<Vec<u8>> {
        self.call(apdu::Command::new_with_le(0xFF, 0xCA, 0x00, 0x00, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_status() {
        assert_eq!(split_status(&[0x01, 0x02, 0x90, 0x00]).ok(), Some(&[0x01, 0x02][..]));
        assert_eq!(split_status(&[0x90, 0x00]).ok(), Some(&[][..]));
        match split_status(&[0x63, 0x00]).unwrap_err() {
            Error::APDU(0x63, 0x00) => {}
            v => panic!("wrong error: {}", v),
        }
        match split_status(&[0x90]).unwrap_err() {
            Error::Response(_) => {}
            v => panic!("wrong error: {}", v),
        }
    }

    #[test]
    fn test_card_absent_keeps_polling() {
        for err in [
            pcsc::Error::NoSmartcard,
            pcsc::Error::RemovedCard,
            pcsc::Error::ResetCard,
            pcsc::Error::UnpoweredCard,
            pcsc::Error::UnresponsiveCard,
        ] {
            assert_eq!(absent_or_fatal(err).ok(), Some(false), "{:?}", err);
        }
        match absent_or_fatal(pcsc::Error::ReaderUnavailable).unwrap_err() {
            Error::ReaderUnavailable(_) => {}
            v => panic!("wrong error: {}", v),
        }
    }

    #[test]
    fn test_encode_load_key() {
        let mut buf = [0; 64];
        let key = [0xD3, 0xF7, 0xD3, 0xF7, 0xD3, 0xF7];
        let cmd = apdu::Command::new_with_payload(0xFF, 0x82, 0x00, KEY_SLOT, &key[..]);
        assert_eq!(
            encode(&cmd, &mut buf),
            &[0xFF, 0x82, 0x00, 0x00, 0x06, 0xD3, 0xF7, 0xD3, 0xF7, 0xD3, 0xF7]
        );
    }

    #[test]
    fn test_encode_read_binary() {
        let mut buf = [0; 64];
        let cmd = apdu::Command::new_with_le(0xFF, 0xB0, 0x00, 0x05, 16);
        assert_eq!(encode(&cmd, &mut buf), &[0xFF, 0xB0, 0x00, 0x05, 0x10]);
    }
}
