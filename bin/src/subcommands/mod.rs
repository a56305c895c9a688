//! Subcommands for the `cannonball` binary

use anyhow::{anyhow, Result};
use cannonball_memory::types::Address;
use clap::Subcommand;

mod convert;
mod proof;
mod read;
mod root;

pub(crate) trait CannonballSubcommandDispatcher {
    /// Dispatches the subcommand
    fn dispatch(self) -> Result<()>;
}

/// The subcommands for the `cannonball` binary
#[derive(Subcommand, Debug)]
pub(crate) enum CannonballSubcommand {
    /// Compute the merkle root of a memory snapshot
    Root(root::RootArgs),
    /// Generate a merkle proof for an address within a memory snapshot
    Proof(proof::ProofArgs),
    /// Dump a range of a memory snapshot as hex
    Read(read::ReadArgs),
    /// Convert a memory snapshot between the binary and JSON encodings
    Convert(convert::ConvertArgs),
}

impl CannonballSubcommandDispatcher for CannonballSubcommand {
    fn dispatch(self) -> Result<()> {
        match self {
            CannonballSubcommand::Root(args) => args.dispatch(),
            CannonballSubcommand::Proof(args) => args.dispatch(),
            CannonballSubcommand::Read(args) => args.dispatch(),
            CannonballSubcommand::Convert(args) => args.dispatch(),
        }
    }
}

/// Parses an [Address] given either as `0x` prefixed hex or as a decimal number.
pub(crate) fn parse_address(s: &str) -> Result<Address> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => Address::from_str_radix(hex, 16),
        None => s.parse::<Address>(),
    };
    parsed.map_err(|e| anyhow!("Invalid address {s}: {e}"))
}
