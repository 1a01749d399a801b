//! `streamdec`: thin drivers over the streaming decoders.
//!
//! ```text
//! streamdec <COMMAND> [OPTIONS] [FILE]
//!
//! Commands:
//!   zcat            Decompress gzip, zlib or raw deflate to stdout
//!   json-ptrs       List the JSON Pointers of every value in a document
//!   json-tokens     Dump the token stream of a JSON document
//!   cbor-to-json    Convert CBOR items to JSON lines
//!   image-info      Print the image header and every frame header
//!   convert-to-nia  Re-encode an image as naive animation (or naive image)
//! ```
//!
//! Input comes from `FILE`, or stdin when it is absent or `-`.
//!
//! # Exit codes
//!
//! | Code | Meaning                                     |
//! |------|---------------------------------------------|
//! | 0    | Success                                     |
//! | 1    | Bad input, unsupported input or I/O failure |
//! | 2    | Internal error in a decoder                 |

use std::{
    fs::File,
    io::{self, Read},
    path::PathBuf,
    process,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use streamdec::{DecodeError, DriveError, Quirk, ReaderSource, json::ValueError};

mod cmd_cbor;
mod cmd_image;
mod cmd_json;
mod cmd_zcat;

/// Streaming decoders for compressed, structured and image formats.
#[derive(Parser)]
#[command(name = "streamdec", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompress gzip, zlib or raw deflate to stdout.
    Zcat(cmd_zcat::ZcatArgs),
    /// List the JSON Pointer of every value, one per line.
    JsonPtrs(cmd_json::PtrsArgs),
    /// Dump JSON tokens with their source offsets.
    JsonTokens(cmd_json::TokensArgs),
    /// Convert each CBOR item to one line of JSON.
    CborToJson(cmd_cbor::CborArgs),
    /// Print the image header and each frame header.
    ImageInfo(cmd_image::InfoArgs),
    /// Write the composited frames of an image as NIA (or NIE) to stdout.
    ConvertToNia(cmd_image::NiaArgs),
}

/// Arguments every command takes.
#[derive(clap::Args)]
pub struct Common {
    /// Input file; stdin when absent or `-`.
    pub file: Option<PathBuf>,

    /// Enable a decoder quirk by name, e.g. `allow-comment-line`. Repeatable.
    #[arg(long = "quirk", value_name = "NAME")]
    pub quirks: Vec<Quirk>,
}

impl Common {
    /// The input as a [`streamdec::Source`].
    pub fn open(&self) -> Result<ReaderSource<Box<dyn Read>>> {
        let reader: Box<dyn Read> = match &self.file {
            Some(path) if path.as_os_str() != "-" => {
                Box::new(File::open(path).with_context(|| format!("cannot open {}", path.display()))?)
            }
            _ => Box::new(io::stdin().lock()),
        };
        Ok(ReaderSource(reader))
    }
}

/// Picks the exit code for a failed command: 2 when any decode error in the
/// chain is internal, 1 otherwise.
fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| {
            if let Some(e) = cause.downcast_ref::<DriveError>() {
                Some(e.exit_code())
            } else if let Some(e) = cause.downcast_ref::<DecodeError>() {
                Some(e.exit_code())
            } else if let Some(ValueError::Decode(e)) = cause.downcast_ref::<ValueError>() {
                Some(e.exit_code())
            } else {
                None
            }
        })
        .unwrap_or(1)
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Zcat(args) => cmd_zcat::run(&args),
        Commands::JsonPtrs(args) => cmd_json::run_ptrs(&args),
        Commands::JsonTokens(args) => cmd_json::run_tokens(&args),
        Commands::CborToJson(args) => cmd_cbor::run(&args),
        Commands::ImageInfo(args) => cmd_image::run_info(&args),
        Commands::ConvertToNia(args) => cmd_image::run_nia(&args),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(exit_code(&e));
    }
}

#[cfg(test)]
mod tests {
    use streamdec::InternalError;

    use super::*;

    #[test]
    fn exit_codes_follow_the_error_chain() {
        let bad = anyhow::Error::new(DriveError::from(DecodeError::UnexpectedEof));
        assert_eq!(exit_code(&bad), 1);

        let internal = anyhow::Error::new(DriveError::from(DecodeError::from(InternalError::InconsistentState)))
            .context("decoding stdin");
        assert_eq!(exit_code(&internal), 2);

        assert_eq!(exit_code(&anyhow::anyhow!("cannot open x")), 1);
    }

    #[test]
    fn quirk_flags_parse() {
        let cli = Cli::try_parse_from(["streamdec", "json-ptrs", "--quirk", "allow-comment-line", "in.json"]).unwrap();
        let Commands::JsonPtrs(args) = cli.command else {
            panic!("wrong command");
        };
        assert_eq!(args.common.quirks, [Quirk::AllowCommentLine]);
        assert!(Cli::try_parse_from(["streamdec", "zcat", "--quirk", "no-such-quirk"]).is_err());

        let cli = Cli::try_parse_from(["streamdec", "cbor-to-json", "--duplicates", "keep-last", "-"]).unwrap();
        let Commands::CborToJson(args) = cli.command else {
            panic!("wrong command");
        };
        assert_eq!(args.duplicates, cmd_json::Duplicates::KeepLast);
    }

    #[test]
    fn cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
