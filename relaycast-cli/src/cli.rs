use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use relaycast_engine::ContentType;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// TOML file overriding engine defaults
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Segment a local transport stream file
    Segment {
        /// Input file
        input: PathBuf,

        /// Directory receiving the segments and the playlist
        #[arg(short, long, default_value = "segments")]
        output_dir: PathBuf,

        /// Segment boundary rule
        #[arg(long, value_enum, default_value_t = BoundaryRule::Keyframe)]
        rule: BoundaryRule,
    },

    /// Pull an HLS upstream and segment it as it arrives
    Pull {
        /// Playlist URL
        url: String,

        /// Directory receiving the segments and the playlist
        #[arg(short, long, default_value = "segments")]
        output_dir: PathBuf,

        /// Stop after this many seconds (runs until Ctrl-C otherwise)
        #[arg(short, long)]
        duration: Option<u64>,

        /// Segment boundary rule
        #[arg(long, value_enum, default_value_t = BoundaryRule::Keyframe)]
        rule: BoundaryRule,
    },

    /// Demux a file and report what the content store received
    Probe {
        /// Input file
        input: PathBuf,

        /// Container format (detected from the first bytes when omitted)
        #[arg(short, long)]
        format: Option<ContentType>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryRule {
    /// Cut at random access points
    Keyframe,
    /// Cut at the first video start after six seconds
    VideoInterval,
}
