use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::mapper::StoreKind;

/// Write camera filter presets into the stock camera's MMKV stores
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Config file (default: <config dir>/preset-inject/config.json)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Read the filter capture from a local file instead of the device
    #[arg(long = "capture", value_name = "FILE", global = true)]
    pub capture: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List captured filters
    Filters {
        /// Camera mode (default: the capture's default mode)
        #[arg(short = 'm', long = "mode")]
        mode: Option<String>,
    },

    /// Resolve a filter name to its index
    Resolve {
        /// Filter text, optionally with an intensity suffix ("复古 80%")
        text: String,

        #[arg(short = 'm', long = "mode")]
        mode: Option<String>,
    },

    /// Show the keys a preset would write
    Plan {
        #[arg(value_name = "PRESET")]
        preset: PathBuf,

        /// Filter index to use instead of resolving the preset's filter
        #[arg(short = 'i', long = "index", value_name = "N")]
        index: Option<u32>,
    },

    /// Write a preset into the camera store
    Apply {
        #[arg(value_name = "PRESET")]
        preset: PathBuf,

        #[arg(short = 'i', long = "index", value_name = "N")]
        index: Option<u32>,
    },

    /// Restore the store directory from the last backup
    Rollback,

    /// Print the integer values held by a store
    Inspect {
        #[arg(value_enum)]
        store: StoreArg,

        /// Include keys outside the effect namespace
        #[arg(short = 'a', long = "all")]
        all: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreArg {
    /// preferences_0 (index 0)
    Preferences,
    /// mmkv (index 1 and up)
    Shared,
}

impl From<StoreArg> for StoreKind {
    fn from(arg: StoreArg) -> Self {
        match arg {
            StoreArg::Preferences => StoreKind::Preferences,
            StoreArg::Shared => StoreKind::Shared,
        }
    }
}
