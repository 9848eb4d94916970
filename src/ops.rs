//! Whole-tag operations. Each one turns the tag layout into a plan of [`Step`]s, then hands
//! it to a [`Session`] together with its source or sink.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{info, trace_span, warn};

use crate::access::{Action, CardAccess, Poll, Session, Step};
use crate::geometry::CardGeometry;
use crate::keys::{KeyTable, Mode};
use crate::layout::LayoutConstant;
use crate::sector::{Role, SectorDescriptor};
use crate::{Block, Error, Result, BLOCK_SIZE};

/// First index past the primary MAD.
pub const FIRST_DATA_INDEX: usize = 4;

/// Size of the zero payload written by Clear. This is the data size of a 1K tag's full
/// memory, and is used for 4K tags too.
pub const CLEAR_LEN: usize = 4096;

/// Where Write gets its bytes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSource {
    FromFile(PathBuf),
    ZeroFilled(usize),
}

impl PayloadSource {
    pub fn load(&self) -> Result<Vec<u8>> {
        match self {
            Self::FromFile(path) => std::fs::read(path).map_err(|source| Error::PayloadSource {
                path: path.clone(),
                source,
            }),
            Self::ZeroFilled(len) => Ok(vec![0; *len]),
        }
    }

    /// Whether running out of data blocks before the payload ends is worth a warning.
    /// Clear's fixed-size zero payload overruns both tag sizes on purpose.
    fn reports_overrun(&self) -> bool {
        matches!(self, Self::FromFile(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Write MAD and sector trailers, starting at `start` (clamped to 4).
    Format { start: usize },
    /// Read every data block into `output`.
    Read { output: PathBuf },
    /// Read every block, trailers and MAD included, into `output`.
    Dump { output: PathBuf },
    /// Write a payload over the data blocks.
    Write { input: PayloadSource },
    /// Zero the data blocks.
    Clear,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Format { .. } => "format",
            Self::Read { .. } => "read",
            Self::Dump { .. } => "dump",
            Self::Write { .. } => "write",
            Self::Clear => "clear",
        }
    }
}

/// Everything about the tag an operation needs besides the card itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagConfig {
    pub geometry: CardGeometry,
    pub ignore_second_mad: bool,
    pub keys: KeyTable,
}

impl TagConfig {
    pub fn new(geometry: CardGeometry) -> Self {
        Self {
            geometry,
            ignore_second_mad: false,
            keys: KeyTable::default(),
        }
    }

    fn describe(&self, index: u8) -> SectorDescriptor {
        SectorDescriptor::describe(index, &self.geometry, self.ignore_second_mad)
    }

    fn step(&self, mode: Mode, index: u8, action: Action) -> Step {
        let sector = self.describe(index);
        Step {
            sector,
            key: self.keys.select(mode, sector.role),
            action,
        }
    }

    fn data_indices(&self) -> impl Iterator<Item = u8> + '_ {
        self.geometry
            .indices()
            .skip(FIRST_DATA_INDEX)
            .filter(|&i| self.describe(i).role == Role::Data)
    }
}

pub fn format_plan(cfg: &TagConfig, start: usize) -> Vec<Step> {
    let start = start.max(FIRST_DATA_INDEX);
    let mut steps = Vec::new();

    let write =
        |index: u8, c: LayoutConstant| cfg.step(Mode::Format, index, Action::Write(c.block()));
    if start == FIRST_DATA_INDEX {
        for index in 1..=3 {
            if let Some(c) = LayoutConstant::for_mad_index(index) {
                steps.push(write(index, c));
            }
        }
    }

    for index in cfg.geometry.indices().skip(start) {
        match cfg.describe(index).role {
            Role::Mad | Role::MadTrailer => {
                if let Some(c) = LayoutConstant::for_mad_index(index) {
                    steps.push(write(index, c));
                }
            }
            Role::Trailer => steps.push(write(index, LayoutConstant::NdefTrailer)),
            Role::Data | Role::Skip => {}
        }
    }
    steps
}

pub fn read_plan(cfg: &TagConfig) -> Vec<Step> {
    cfg.data_indices()
        .map(|i| cfg.step(Mode::Read, i, Action::Read))
        .collect()
}

pub fn dump_plan(cfg: &TagConfig) -> Vec<Step> {
    cfg.geometry
        .indices()
        .map(|i| cfg.step(Mode::Dump, i, Action::Read))
        .collect()
}

/// One step per 16 bytes of payload, until either the payload or the data blocks run out.
/// A trailing partial block is zero-padded.
pub fn write_plan(cfg: &TagConfig, payload: &[u8]) -> Vec<Step> {
    cfg.data_indices()
        .zip(payload.chunks(BLOCK_SIZE))
        .map(|(i, chunk)| {
            let mut block: Block = [0; BLOCK_SIZE];
            block[..chunk.len()].copy_from_slice(chunk);
            cfg.step(Mode::Write, i, Action::Write(block))
        })
        .collect()
}

/// What an operation got done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub sectors: usize,
    pub bytes: usize,
}

/// Runs an operation end to end: prepares its source or sink, waits for a card, executes.
pub fn execute<C: CardAccess + ?Sized>(
    card: &mut C,
    poll: &Poll,
    cfg: &TagConfig,
    op: &Operation,
) -> Result<Outcome> {
    let span = trace_span!("execute", ?op);
    let _enter = span.enter();

    match op {
        Operation::Format { start } => {
            info!(sectors = cfg.geometry.sector_count, "NDEF formatting card/tag");
            let steps = format_plan(cfg, *start);
            let mut session = Session::open(card, poll)?;
            let sectors = session.run(&steps, &mut std::io::sink())?;
            Ok(Outcome {
                sectors,
                bytes: sectors * BLOCK_SIZE,
            })
        }
        Operation::Read { output } => {
            info!("Reading card/tag");
            let steps = read_plan(cfg);
            read_into(card, poll, &steps, output, false)
        }
        Operation::Dump { output } => {
            info!("Dumping card/tag");
            let steps = dump_plan(cfg);
            read_into(card, poll, &steps, output, true)
        }
        Operation::Write { input } => write_payload(card, poll, cfg, input),
        Operation::Clear => {
            info!("Clearing card/tag");
            write_payload(card, poll, cfg, &PayloadSource::ZeroFilled(CLEAR_LEN))
        }
    }
}

fn read_into<C: CardAccess + ?Sized>(
    card: &mut C,
    poll: &Poll,
    steps: &[Step],
    output: &Path,
    log_uid: bool,
) -> Result<Outcome> {
    let mut sink = BufWriter::new(File::create(output)?);
    let mut session = Session::open(card, poll)?;
    if log_uid {
        match session.uid() {
            Ok(uid) => info!(uid = hex::encode_upper(&uid), len = uid.len(), "UID"),
            Err(err) => warn!(%err, "Couldn't read UID"),
        }
    }
    let sectors = session.run(steps, &mut sink)?;
    sink.flush()?;
    Ok(Outcome {
        sectors,
        bytes: sectors * BLOCK_SIZE,
    })
}

fn write_payload<C: CardAccess + ?Sized>(
    card: &mut C,
    poll: &Poll,
    cfg: &TagConfig,
    input: &PayloadSource,
) -> Result<Outcome> {
    // Load everything up front, so a bad file never gets as far as the card.
    let payload = input.load()?;
    info!(len = payload.len(), "Writing data to card/tag");
    let steps = write_plan(cfg, &payload);
    if input.reports_overrun() && steps.len() * BLOCK_SIZE < payload.len() {
        warn!(
            capacity = cfg.geometry.data_capacity(cfg.ignore_second_mad),
            len = payload.len(),
            "Payload doesn't fit, truncating"
        );
    }

    let mut session = Session::open(card, poll)?;
    let sectors = session.run(&steps, &mut std::io::sink())?;
    Ok(Outcome {
        sectors,
        bytes: payload.len().min(sectors * BLOCK_SIZE),
    })
}
