use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub const DEFAULT_CONFIG_PATH: &str = "backupstore.toml";

#[derive(Parser, Debug)]
#[command(name = "backupstore")]
#[command(about = "Backup object storage operations", version)]
pub struct Cli {
    /// Store definition file
    #[arg(long, short, env = "BACKUPSTORE_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Upload a file, or stdin when the source is `-`
    Put {
        bucket: String,
        key: String,
        source: String,
    },
    /// Download an object to a file, or stdout when no file is given
    Get {
        bucket: String,
        key: String,
        dest: Option<PathBuf>,
    },
    /// Print whether an object exists
    Exists { bucket: String, key: String },
    /// List object keys under a prefix
    Ls {
        bucket: String,
        #[arg(default_value = "")]
        prefix: String,
    },
    /// List common prefixes one delimiter level below a prefix
    Prefixes {
        bucket: String,
        #[arg(default_value = "")]
        prefix: String,
        #[arg(long, default_value = "/")]
        delimiter: String,
    },
    /// Delete an object
    Rm { bucket: String, key: String },
    /// Print a time-limited download URL
    Sign {
        bucket: String,
        key: String,
        #[arg(long, default_value_t = 600)]
        ttl_secs: u64,
    },
}
