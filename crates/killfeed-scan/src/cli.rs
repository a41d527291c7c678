use std::ffi::OsString;
use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{ArgMatches, Args, CommandFactory, FromArgMatches, Parser, Subcommand, ValueEnum};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum DumpFormat {
    Png,
    Jpeg,
}

impl DumpFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            DumpFormat::Png => "png",
            DumpFormat::Jpeg => "jpg",
        }
    }
}

#[derive(Debug, Default)]
pub struct CliSources {
    pub sample_fps_from_cli: bool,
    pub dump_format_from_cli: bool,
    pub clip_from_cli: bool,
}

impl CliSources {
    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            sample_fps_from_cli: value_from_cli(matches, "sample_fps"),
            dump_format_from_cli: value_from_cli(matches, "dump_format"),
            clip_from_cli: value_from_cli(matches, "clip"),
        }
    }
}

fn value_from_cli(matches: &ArgMatches, id: &str) -> bool {
    matches
        .value_source(id)
        .is_some_and(|source| matches!(source, ValueSource::CommandLine))
}

pub fn parse_cli() -> (CliArgs, CliSources) {
    match parse_cli_from(std::env::args_os()) {
        Ok(parsed) => parsed,
        Err(err) => err.exit(),
    }
}

pub fn parse_cli_from<I, T>(args: I) -> Result<(CliArgs, CliSources), clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let command = CliArgs::command();
    let matches = command.try_get_matches_from(args)?;
    let args = CliArgs::from_arg_matches(&matches)?;
    let sources = matches
        .subcommand()
        .map(|(_, sub)| CliSources::from_matches(sub))
        .unwrap_or_default();
    Ok((args, sources))
}

#[derive(Debug, Parser)]
#[command(
    name = "killfeed-scan",
    about = "Detect killfeed entries in gameplay recordings and index them as events",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Analyze a single video file
    Analyze {
        /// Input video path
        #[arg(value_name = "VIDEO")]
        video: PathBuf,

        #[command(flatten)]
        options: RunOptions,
    },
    /// Analyze every video file in a folder
    Batch {
        /// Folder containing the videos
        #[arg(value_name = "FOLDER")]
        folder: PathBuf,

        #[command(flatten)]
        options: RunOptions,
    },
    /// Print the list of available decoding backends
    Backends,
}

#[derive(Debug, Args)]
pub struct RunOptions {
    /// Override the configuration file path
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Plan clip windows for the detected events
    #[arg(long = "clip", id = "clip")]
    pub clip: bool,

    /// Directory that receives the event and clip exports
    #[arg(short = 'o', long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Lock decoding to a specific backend implementation
    #[arg(short = 'b', long = "backend")]
    pub backend: Option<String>,

    /// Frames per second handed to the detector
    #[arg(
        long = "sample-fps",
        id = "sample_fps",
        default_value_t = 3.0,
        value_parser = clap::value_parser!(f64)
    )]
    pub sample_fps: f64,

    /// Output directory for annotated crops of frames with detections
    #[arg(long = "dump-dir")]
    pub dump_dir: Option<PathBuf>,

    /// Image format for dumped crops when --dump-dir is set
    #[arg(
        long = "dump-format",
        id = "dump_format",
        value_enum,
        default_value_t = DumpFormat::Png
    )]
    pub dump_format: DumpFormat,

    /// Decoder frame queue capacity before applying backpressure
    #[arg(
        long = "decoder-channel-capacity",
        id = "decoder_channel_capacity",
        value_parser = clap::value_parser!(usize)
    )]
    pub decoder_channel_capacity: Option<usize>,
}
