//! relkv command line - inspect relation namespaces held in the
//! key-value backend.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relkv::page::{SlottedPage, BLOCK_SIZE, FIRST_SLOT};
use relkv::relpath::{relation_path, ForkNumber, RelFileLocator};
use relkv::smgr::{StorageManager, DEFAULT_ROOT};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Storage root directory
    #[arg(short = 'D', long, default_value = DEFAULT_ROOT)]
    data_dir: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct Target {
    /// Database OID
    #[arg(long)]
    db: u32,

    /// Relation number
    #[arg(long)]
    rel: u32,

    /// Fork name: main, fsm, vm, or init
    #[arg(long, default_value = "main")]
    fork: String,
}

impl Target {
    fn locator(&self) -> RelFileLocator {
        RelFileLocator::new(self.db, self.rel)
    }

    fn fork(&self) -> Result<ForkNumber> {
        match self.fork.as_str() {
            "main" => Ok(ForkNumber::Main),
            "fsm" => Ok(ForkNumber::FreeSpaceMap),
            "vm" => Ok(ForkNumber::VisibilityMap),
            "init" => Ok(ForkNumber::Init),
            other => anyhow::bail!("unknown fork: {} (expected main, fsm, vm or init)", other),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a relation fork
    Create {
        #[command(flatten)]
        target: Target,
    },
    /// Print the number of blocks in a relation fork
    Nblocks {
        #[command(flatten)]
        target: Target,
    },
    /// Decode one block and print its slot directory
    Dump {
        #[command(flatten)]
        target: Target,

        /// Block number to decode
        #[arg(long)]
        block: u32,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let smgr = StorageManager::new(&args.data_dir);
    match args.command {
        Command::Create { target } => {
            let fork = target.fork()?;
            smgr.create(target.locator(), fork, false)
                .context("failed to create relation")?;
            println!("created {}", relation_path(target.locator(), fork));
        }
        Command::Nblocks { target } => {
            let count = smgr
                .nblocks(target.locator(), target.fork()?)
                .context("failed to read block count")?;
            println!("{}", count);
        }
        Command::Dump { target, block } => {
            let mut buffer = Box::new([0u8; BLOCK_SIZE]);
            smgr.read(target.locator(), target.fork()?, block, &mut buffer)
                .context("failed to read block")?;

            let page = SlottedPage::from_bytes(&mut buffer);
            println!(
                "block {}: {} slots, special size {}",
                block,
                page.max_slot(),
                page.special_size()
            );
            for slot in FIRST_SLOT..=page.max_slot() {
                let state = page.slot_state(slot)?;
                let len = page.item(slot).map(|item| item.len()).unwrap_or(0);
                println!("  slot {}: {:?}, {} bytes", slot, state, len);
            }
        }
    }
    Ok(())
}
