use anyhow::Result;
use clap::{Parser, Subcommand};

use zfs_chain::cli::{run_backup, run_cleanup, run_restore, BackupArgs, CleanupArgs, RestoreArgs};

#[derive(Parser)]
#[command(
    name = "zfs-chain",
    version,
    about = "Chain-based ZFS backup and restore",
    long_about = "zfs-chain captures a ZFS dataset as chains of serialized snapshot \
                  streams: one full snapshot anchors each chain and differentials \
                  extend it until the chain ages out. Restores replay a chain in \
                  order, full first, into a target pool."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take a full or differential backup of a dataset
    Backup(BackupArgs),

    /// Restore a chain into a pool
    Restore(RestoreArgs),

    /// Prune aged chains and orphaned snapshots
    Cleanup(CleanupArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Backup(args) => run_backup(args)?,
        Commands::Restore(args) => run_restore(args)?,
        Commands::Cleanup(args) => run_cleanup(args)?,
    }

    Ok(())
}
