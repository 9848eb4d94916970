use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser as _;
use owo_colors::OwoColorize;
use tracing::{info, trace, warn};

use mfndef::access::{Attempts, Poll};
use mfndef::keys::{parse_key, KeySlot, KeyTable};
use mfndef::ops::{self, Operation, PayloadSource, TagConfig};
use mfndef::reader::{self, PcscReader};
use mfndef::{CardGeometry, SizeClass};

/// Pause between two looks for a card.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// NDEF format, read, write, clear and dump Mifare Classic cards/tags.
#[derive(clap::Parser, Debug)]
#[command(version)]
#[command(group(
    clap::ArgGroup::new("operation")
        .required(true)
        .args(["read", "write", "dump", "format", "clear", "list_readers"]),
))]
struct Args {
    /// Read the data area of a card/tag into FILE.
    #[arg(short, long, value_name = "FILE")]
    read: Option<PathBuf>,

    /// Write FILE to the data area of a card/tag.
    #[arg(short, long, value_name = "FILE")]
    write: Option<PathBuf>,

    /// Dump the entire card/tag, trailers included, into FILE.
    #[arg(short, long, value_name = "FILE")]
    dump: Option<PathBuf>,

    /// NDEF format a card/tag, starting at sector SEC.
    #[arg(short, long, value_name = "SEC")]
    format: Option<usize>,

    /// Clear/wipe the data area.
    #[arg(short, long)]
    clear: bool,

    /// The card/tag is a Mifare 4K.
    #[arg(short = '4', long)]
    mf4k: bool,

    /// Ignore the second MAD on a Mifare 4K.
    #[arg(short = 'm', long)]
    ign4kmad: bool,

    /// Authenticate with key B instead of key A.
    #[arg(short = 'B', long)]
    key_b: bool,

    /// NDEF sector key, as hex.
    #[arg(short = 'k', long, value_name = "HEX")]
    ndef_key: Option<String>,

    /// MAD sector key, as hex.
    #[arg(long, value_name = "HEX")]
    mad_key: Option<String>,

    /// Use a specific reader (from --list-readers).
    #[arg(long)]
    reader: Option<String>,

    /// List connected readers.
    #[arg(short, long)]
    list_readers: bool,

    /// How many times to look for a card before giving up.
    #[arg(long, value_name = "N|forever", default_value = "forever")]
    wait: Attempts,

    /// Increase log level.
    #[arg(short, long, action=clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease log level.
    #[arg(short, long, action=clap::ArgAction::Count)]
    quiet: u8,
}

impl Args {
    fn size_class(&self) -> SizeClass {
        if self.mf4k {
            SizeClass::FourK
        } else {
            SizeClass::OneK
        }
    }

    fn key_table(&self) -> Result<KeyTable> {
        let mut keys = KeyTable::default();
        if let Some(hex) = &self.ndef_key {
            keys.ndef = parse_key("NDEF", hex)?;
        }
        if let Some(hex) = &self.mad_key {
            keys.mad = parse_key("MAD", hex)?;
        }
        if self.key_b {
            info!("Using B key to authenticate");
            keys = keys.with_slot(KeySlot::B);
        }
        Ok(keys)
    }

    fn tag_config(&self) -> Result<TagConfig> {
        if self.ign4kmad && !self.mf4k {
            warn!("--ign4kmad only applies to Mifare 4K, ignoring");
        }
        Ok(TagConfig {
            geometry: CardGeometry::new(self.size_class()),
            ignore_second_mad: self.mf4k && self.ign4kmad,
            keys: self.key_table()?,
        })
    }

    fn operation(&self) -> Option<Operation> {
        if let Some(output) = &self.read {
            Some(Operation::Read {
                output: output.clone(),
            })
        } else if let Some(input) = &self.write {
            Some(Operation::Write {
                input: PayloadSource::FromFile(input.clone()),
            })
        } else if let Some(output) = &self.dump {
            Some(Operation::Dump {
                output: output.clone(),
            })
        } else if let Some(start) = self.format {
            Some(Operation::Format { start })
        } else if self.clear {
            Some(Operation::Clear)
        } else {
            None
        }
    }
}

fn list_readers() -> Result<()> {
    for name in reader::list_readers().context("couldn't list readers")? {
        println!("{}", name);
    }
    Ok(())
}

fn run(args: &Args, op: &Operation) -> Result<()> {
    let cfg = args.tag_config()?;
    let poll = Poll {
        attempts: args.wait,
        interval: POLL_INTERVAL,
    };
    if args.mf4k {
        info!("Mifare 4k");
    }

    let mut reader = PcscReader::open(args.reader.as_deref(), cfg.geometry.size_class)
        .context("error opening reader")?;
    if poll.attempts == Attempts::Unbounded {
        println!("Waiting for a card/tag... (Ctrl+C to quit)");
    }
    let outcome = ops::execute(&mut reader, &poll, &cfg, op)
        .with_context(|| format!("{} failed", op.name()))?;

    println!(
        "{} {} sectors, {} bytes",
        op.name().green(),
        outcome.sectors.bold(),
        outcome.bytes.bold(),
    );
    Ok(())
}

fn init_logging(args: &Args) {
    tracing_subscriber::fmt()
        .without_time()
        .with_target(false)
        .with_max_level(match 2 + args.verbose as i16 - args.quiet as i16 {
            i16::MIN..=0 => tracing::Level::ERROR,
            1 => tracing::Level::WARN,
            2 => tracing::Level::INFO,
            3 => tracing::Level::DEBUG,
            4.. => tracing::Level::TRACE,
        })
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);
    trace!(?args, "Starting up");

    if args.list_readers {
        return list_readers();
    }
    let op = args.operation().context("no operation given")?;
    run(&args, &op)
}
