use clap::{Parser, Subcommand, ValueEnum};
use domain::MediaKind;
use std::path::PathBuf;

use crate::DEFAULT_SERVER;

#[derive(Parser, Debug)]
#[command(name = "tubegrab", version, about = "Find a video and save its audio or video track")]
pub struct Cli {
    /// Base address of the proxy
    #[arg(long, global = true, env = "TUBEGRAB_SERVER", default_value = DEFAULT_SERVER)]
    pub server: String,

    /// Log requests to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the best match for a query
    Search {
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Search, then download the best match
    Get {
        #[arg(required = true)]
        query: Vec<String>,
        #[arg(short, long, value_enum, default_value_t = Kind::Audio)]
        kind: Kind,
        /// Destination directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Download a video page URL directly
    Download {
        url: String,
        #[arg(short, long, value_enum, default_value_t = Kind::Audio)]
        kind: Kind,
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Kind {
    Audio,
    Video,
}

impl From<Kind> for MediaKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Audio => MediaKind::Audio,
            Kind::Video => MediaKind::Video,
        }
    }
}
