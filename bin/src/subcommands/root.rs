//! The `root` subcommand for the cannonball binary

use super::CannonballSubcommandDispatcher;
use crate::snapshot::load_snapshot;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

/// Command line arguments for `cannonball root`
#[derive(Args, Debug)]
#[command(author, version, about)]
pub(crate) struct RootArgs {
    /// The path to the input memory snapshot.
    #[arg(long, short)]
    input: PathBuf,
}

impl CannonballSubcommandDispatcher for RootArgs {
    fn dispatch(self) -> Result<()> {
        let mut memory = load_snapshot(&self.input)?;
        let root = memory.merkle_root()?;

        tracing::info!(target: "cannonball-cli::root", "Computed memory root. pages: {} mem size: {}", memory.page_count(), memory.usage());
        println!("{}", root);
        Ok(())
    }
}
