use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use isa32::assembler::{assemble_program, listing};
use isa32::image::write_image;

/// Assembles a source file into a little-endian word image.
#[derive(Parser, Debug)]
#[command(name = "isa32-asm", version)]
struct Args {
  /// Assembly source
  input: PathBuf,

  /// Where to write the image
  output: PathBuf,

  /// Print an address / word / disassembly table of the image
  #[arg(long)]
  listing: bool,

  /// Enable debug logging
  #[arg(short, long)]
  verbose: bool,
}

fn main() -> Result<()> {
  let args = Args::parse();

  let log_level = if args.verbose { "debug" } else { "warn" };
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
    .format_timestamp_millis()
    .init();

  let source =
    fs::read_to_string(&args.input)
      .with_context(|| format!("reading {}", args.input.display()))?;
  let assembly =
    assemble_program(&source)
      .with_context(|| format!("assembling {}", args.input.display()))?;

  write_image(&args.output, &assembly.words)
    .with_context(|| format!("writing {}", args.output.display()))?;
  info!("wrote {} words to {}", assembly.words.len(), args.output.display());

  if args.listing {
    println!("{}", listing(&assembly.words, &assembly.symbols));
  }

  Ok(())
}
