//! The `convert` subcommand for the cannonball binary

use super::CannonballSubcommandDispatcher;
use crate::snapshot::{load_snapshot, write_snapshot};
use anyhow::{ensure, Result};
use clap::Args;
use std::path::PathBuf;

/// Command line arguments for `cannonball convert`
#[derive(Args, Debug)]
#[command(author, version, about)]
pub(crate) struct ConvertArgs {
    /// The path to the input memory snapshot.
    #[arg(long, short)]
    input: PathBuf,

    /// The path to write the converted memory snapshot to. The encoding is picked from the
    /// file name.
    #[arg(long, short)]
    output: PathBuf,
}

impl CannonballSubcommandDispatcher for ConvertArgs {
    fn dispatch(self) -> Result<()> {
        let mut memory = load_snapshot(&self.input)?;
        let root = memory.merkle_root()?;

        write_snapshot(&self.output, &memory)?;

        // Read the output back to make sure it commits to the same memory.
        let reloaded_root = load_snapshot(&self.output)?.merkle_root()?;
        ensure!(
            root == reloaded_root,
            "Converted snapshot root {} does not match input root {}",
            reloaded_root,
            root
        );

        tracing::info!(target: "cannonball-cli::convert", "Converted {} -> {}. root: {}", self.input.display(), self.output.display(), root);
        Ok(())
    }
}
