//! The `read` subcommand for the cannonball binary

use super::{parse_address, CannonballSubcommandDispatcher};
use crate::snapshot::load_snapshot;
use alloy_primitives::hex;
use anyhow::Result;
use cannonball_memory::types::{Address, Word};
use clap::Args;
use std::{io::Read, path::PathBuf};

/// Command line arguments for `cannonball read`
#[derive(Args, Debug)]
#[command(author, version, about)]
pub(crate) struct ReadArgs {
    /// The path to the input memory snapshot.
    #[arg(long, short)]
    input: PathBuf,

    /// The address to start reading at, as `0x` prefixed hex or decimal.
    #[arg(long, short, value_parser = parse_address)]
    address: Address,

    /// The number of bytes to read.
    #[arg(long, short, default_value_t = 32)]
    length: Word,
}

impl CannonballSubcommandDispatcher for ReadArgs {
    fn dispatch(self) -> Result<()> {
        let mut memory = load_snapshot(&self.input)?;

        let mut buf = Vec::with_capacity(self.length as usize);
        memory.read_memory_range(self.address, self.length).read_to_end(&mut buf)?;

        tracing::info!(target: "cannonball-cli::read", "Read {} bytes at {:#x}", buf.len(), self.address);
        println!("0x{}", hex::encode(buf));
        Ok(())
    }
}
