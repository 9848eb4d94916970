//! The authenticate-then-transfer engine.
//!
//! A [`Session`] owns the card for the length of one operation. It waits for a card, then
//! runs a plan of [`Step`]s in order: authenticate the step's index, move one block, repeat.
//! The first failure aborts the whole plan; nothing is retried except the presence poll.

use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, info, trace, trace_span, warn};

use crate::keys::Key;
use crate::sector::SectorDescriptor;
use crate::{Block, Error, Result};

/// The reader-side primitives an operation needs.
///
/// `init_layer2`/`init_layer3` return `Ok(false)` while there's no (usable) card in the
/// field; an `Err` means the reader itself is gone.
pub trait CardAccess {
    /// ISO14443-3A anticollision and selection.
    fn init_layer2(&mut self) -> Result<bool>;
    /// Checks the selected card speaks Mifare Classic.
    fn init_layer3(&mut self) -> Result<bool>;
    fn authenticate(&mut self, index: u8, key: &Key) -> Result<()>;
    fn read_block(&mut self, index: u8) -> Result<Block>;
    fn write_block(&mut self, index: u8, data: &Block) -> Result<()>;
    fn uid(&mut self) -> Result<Vec<u8>>;
}

/// How many times to look for a card before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempts {
    /// Keep polling until a card shows up or the process is killed.
    Unbounded,
    Limited(u32),
}

impl FromStr for Attempts {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "forever" | "unbounded" => Ok(Self::Unbounded),
            n => match n.parse::<u32>() {
                Ok(0) => Err("attempts must be at least 1".into()),
                Ok(n) => Ok(Self::Limited(n)),
                Err(_) => Err(format!("expected a number or 'forever', got {:?}", n)),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poll {
    pub attempts: Attempts,
    /// Pause between attempts.
    pub interval: Duration,
}

impl Poll {
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            attempts: Attempts::Unbounded,
            interval,
        }
    }

    pub fn limited(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts: Attempts::Limited(attempts),
            interval,
        }
    }
}

/// What to do with the block once the sector is authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Read it and append it to the sink.
    Read,
    Write(Block),
}

/// One authenticate-then-transfer unit of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub sector: SectorDescriptor,
    pub key: Key,
    pub action: Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    CardPresent,
    SectorAuthenticated(u8),
    SectorTransferred(u8),
    Done,
    Aborted,
}

/// A card session. Exists only once a card has been found, and borrows the card access
/// layer exclusively until it's dropped.
pub struct Session<'a, C: CardAccess + ?Sized> {
    card: &'a mut C,
    state: State,
}

impl<C: CardAccess + ?Sized> fmt::Debug for Session<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<'a, C: CardAccess + ?Sized> Session<'a, C> {
    /// Waits for a compatible card according to `poll`.
    pub fn open(card: &'a mut C, poll: &Poll) -> Result<Self> {
        let span = trace_span!("open_session");
        let _enter = span.enter();

        let mut slf = Self {
            card,
            state: State::Idle,
        };
        slf.wait_for_card(poll)?;
        Ok(slf)
    }

    fn wait_for_card(&mut self, poll: &Poll) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            trace!(attempt, "Polling for card");
            if self.card.init_layer2()? {
                debug!("ISO14443-3A anticollision succeeded");
                if self.card.init_layer3()? {
                    info!("Mifare card available");
                    self.state = State::CardPresent;
                    return Ok(());
                }
            }

            if let Attempts::Limited(max) = poll.attempts {
                if attempt >= max {
                    return Err(Error::NoCard { attempts: attempt });
                }
            }
            if !poll.interval.is_zero() {
                std::thread::sleep(poll.interval);
            }
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn uid(&mut self) -> Result<Vec<u8>> {
        self.card.uid()
    }

    /// Runs a plan, appending read blocks to `sink`. Returns the number of steps completed.
    ///
    /// On failure the sink is flushed and keeps whatever was already read.
    pub fn run<W: Write + ?Sized>(&mut self, steps: &[Step], sink: &mut W) -> Result<usize> {
        let span = trace_span!("run", steps = steps.len());
        let _enter = span.enter();

        for (done, step) in steps.iter().enumerate() {
            if let Err(err) = self.step(step, sink) {
                self.state = State::Aborted;
                if let Err(flush_err) = sink.flush() {
                    warn!(%flush_err, "Couldn't flush output after abort");
                }
                debug!(done, "Aborted");
                return Err(err);
            }
        }
        sink.flush()?;
        self.state = State::Done;
        Ok(steps.len())
    }

    fn step<W: Write + ?Sized>(&mut self, step: &Step, sink: &mut W) -> Result<()> {
        let index = step.sector.index;
        debug!(index, role = ?step.sector.role, slot = ?step.key.slot, "Authenticating");
        self.card
            .authenticate(index, &step.key)
            .map_err(|err| Error::Authentication {
                index,
                slot: step.key.slot,
                source: Box::new(err),
            })?;
        self.state = State::SectorAuthenticated(index);

        match &step.action {
            Action::Read => {
                info!(index, "Reading sector");
                let block = self.card.read_block(index).map_err(|err| Error::Transfer {
                    index,
                    op: "read",
                    source: Box::new(err),
                })?;
                sink.write_all(&block)?;
            }
            Action::Write(data) => {
                info!(index, "Writing sector");
                self.card
                    .write_block(index, data)
                    .map_err(|err| Error::Transfer {
                        index,
                        op: "write",
                        source: Box::new(err),
                    })?;
            }
        }
        self.state = State::SectorTransferred(index);
        Ok(())
    }
}
