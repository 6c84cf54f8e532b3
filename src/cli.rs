use clap::Parser;

use crate::zip::{DEFAULT_PARTITIONS, DEFAULT_WORKERS};

#[derive(Parser, Debug)]
#[command(name = "netzip")]
#[command(version)]
#[command(about = "Extract files from remote ZIP archives over HTTP Range requests", long_about = None)]
#[command(after_help = "Examples:\n  \
  netzip https://example.com/archive.zip          extract everything here\n  \
  netzip -d out https://example.com/archive.zip   extract into out/\n  \
  netzip -l https://example.com/archive.zip       list files without extracting")]
pub struct Cli {
    /// HTTP(S) URL of the remote ZIP archive
    #[arg(value_name = "URL")]
    pub url: String,

    /// Extract files into this directory (created if absent)
    #[arg(short = 'd', long = "dest", value_name = "DIR", default_value = ".")]
    pub dest: String,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Ranged requests per entry payload
    #[arg(long, value_name = "N", default_value_t = DEFAULT_PARTITIONS)]
    pub partitions: usize,

    /// Entries retrieved concurrently
    #[arg(long, value_name = "N", default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }
}
