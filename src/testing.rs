//! An in-memory tag for exercising operations without a reader.

use crate::access::CardAccess;
use crate::keys::{Key, KeySlot};
use crate::{Block, Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Authenticate(u8, KeySlot),
    Read(u8),
    Write(u8),
    Uid,
}

#[derive(Debug)]
pub struct MemoryTag {
    pub blocks: Vec<Block>,
    pub calls: Vec<Call>,
    /// Key bytes used for every authentication, in order.
    pub keys: Vec<(u8, [u8; 6])>,
    pub uid: Vec<u8>,
    arrive_after: u32,
    polls: u32,
    unplugged: bool,
    fail_auth_at: Option<u8>,
    fail_read_at: Option<u8>,
    fail_write_at: Option<u8>,
    authenticated: Option<u8>,
}

impl MemoryTag {
    pub fn new(blocks: usize) -> Self {
        Self {
            blocks: vec![[0; 16]; blocks],
            calls: Vec::new(),
            keys: Vec::new(),
            uid: vec![0xDE, 0xAD, 0xBE, 0xEF],
            arrive_after: 0,
            polls: 0,
            unplugged: false,
            fail_auth_at: None,
            fail_read_at: None,
            fail_write_at: None,
            authenticated: None,
        }
    }

    pub fn one_k() -> Self {
        Self::new(64)
    }

    pub fn four_k() -> Self {
        Self::new(256)
    }

    /// The card only shows up on the (n+1)th poll.
    pub fn arriving_after(mut self, n: u32) -> Self {
        self.arrive_after = n;
        self
    }

    pub fn unplugged(mut self) -> Self {
        self.unplugged = true;
        self
    }

    pub fn failing_auth_at(mut self, index: u8) -> Self {
        self.fail_auth_at = Some(index);
        self
    }

    pub fn failing_read_at(mut self, index: u8) -> Self {
        self.fail_read_at = Some(index);
        self
    }

    pub fn failing_write_at(mut self, index: u8) -> Self {
        self.fail_write_at = Some(index);
        self
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Indices that were authenticated, in order.
    pub fn authenticated(&self) -> Vec<u8> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Authenticate(i, _) => Some(*i),
                _ => None,
            })
            .collect()
    }

    /// Indices that were written, in order.
    pub fn written(&self) -> Vec<u8> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Write(i) => Some(*i),
                _ => None,
            })
            .collect()
    }

    fn check_auth(&self, index: u8) -> Result<()> {
        if self.authenticated == Some(index) {
            Ok(())
        } else {
            Err(Error::APDU(0x69, 0x82))
        }
    }
}

impl CardAccess for MemoryTag {
    fn init_layer2(&mut self) -> Result<bool> {
        if self.unplugged {
            return Err(Error::ReaderUnavailable("unplugged".into()));
        }
        self.polls += 1;
        Ok(self.polls > self.arrive_after)
    }

    fn init_layer3(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn authenticate(&mut self, index: u8, key: &Key) -> Result<()> {
        self.calls.push(Call::Authenticate(index, key.slot));
        self.keys.push((index, key.bytes));
        self.authenticated = None;
        if self.fail_auth_at == Some(index) || index as usize >= self.blocks.len() {
            return Err(Error::APDU(0x63, 0x00));
        }
        self.authenticated = Some(index);
        Ok(())
    }

    fn read_block(&mut self, index: u8) -> Result<Block> {
        self.calls.push(Call::Read(index));
        self.check_auth(index)?;
        if self.fail_read_at == Some(index) {
            return Err(Error::APDU(0x63, 0x00));
        }
        Ok(self.blocks[index as usize])
    }

    fn write_block(&mut self, index: u8, data: &Block) -> Result<()> {
        self.calls.push(Call::Write(index));
        self.check_auth(index)?;
        if self.fail_write_at == Some(index) {
            return Err(Error::APDU(0x63, 0x00));
        }
        self.blocks[index as usize] = *data;
        Ok(())
    }

    fn uid(&mut self) -> Result<Vec<u8>> {
        self.calls.push(Call::Uid);
        Ok(self.uid.clone())
    }
}
