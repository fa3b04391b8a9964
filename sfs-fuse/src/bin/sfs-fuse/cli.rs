use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
pub struct Cli {
    /// Volume image file
    #[arg(long, short)]
    pub image: PathBuf,

    /// Block size of the image in bytes
    #[arg(long, default_value_t = 1024)]
    pub block_size: u32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a fresh, empty volume
    Format {
        /// Total number of blocks
        #[arg(long, default_value_t = 1024)]
        blocks: u32,

        /// Number of inodes, also the directory capacity
        #[arg(long, default_value_t = 200)]
        inodes: u32,
    },

    /// Copy a host file into the volume
    Put {
        host: PathBuf,

        /// Name inside the volume, defaults to the host file name
        #[arg(long, short)]
        name: Option<String>,
    },

    /// Copy a file out of the volume
    Get { name: String, host: PathBuf },

    /// List every file with its size
    Ls,

    /// Remove a file
    Rm { name: String },

    /// Show the metadata of a file
    Stat { name: String },
}
