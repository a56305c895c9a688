//! The `proof` subcommand for the cannonball binary

use super::{parse_address, CannonballSubcommandDispatcher};
use crate::snapshot::load_snapshot;
use alloy_primitives::hex;
use anyhow::{ensure, Result};
use cannonball_memory::{types::Address, verify_proof};
use clap::Args;
use std::path::PathBuf;

/// Command line arguments for `cannonball proof`
#[derive(Args, Debug)]
#[command(author, version, about)]
pub(crate) struct ProofArgs {
    /// The path to the input memory snapshot.
    #[arg(long, short)]
    input: PathBuf,

    /// The address to prove, as `0x` prefixed hex or decimal.
    #[arg(long, short, value_parser = parse_address)]
    address: Address,

    /// Check the proof against the memory root before printing it.
    #[arg(long)]
    verify: bool,
}

impl CannonballSubcommandDispatcher for ProofArgs {
    fn dispatch(self) -> Result<()> {
        let mut memory = load_snapshot(&self.input)?;
        let root = memory.merkle_root()?;
        let proof = memory.merkle_proof(self.address)?;

        tracing::info!(target: "cannonball-cli::proof", "Generated proof for address {:#x} against root {}", self.address, root);

        if self.verify {
            ensure!(
                verify_proof(root, self.address, &proof),
                "Proof for address {:#x} does not verify against root {}",
                self.address,
                root
            );
            tracing::info!(target: "cannonball-cli::proof", "Proof verified");
        }

        println!("0x{}", hex::encode(proof));
        Ok(())
    }
}
