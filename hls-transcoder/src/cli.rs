use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "hls-transcoder", version, about = "HLS ladder transcoder with incremental segment publishing")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP/WebSocket service (default)
    Serve,
    /// Probe a media file and print its characteristics
    Probe {
        /// File to inspect
        file: PathBuf,
        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let args = Args::try_parse_from(["hls-transcoder"]).unwrap();
        assert!(args.command.is_none());
    }

    #[test]
    fn parses_probe_with_json_flag() {
        let args = Args::try_parse_from(["hls-transcoder", "probe", "clip.mp4", "--json"]).unwrap();
        match args.command {
            Some(Commands::Probe { file, json }) => {
                assert_eq!(file, PathBuf::from("clip.mp4"));
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
