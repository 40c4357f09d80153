use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use log::info;

use isa32::config::{MachineConfig, DEFAULT_TIMER_PERIOD};
use isa32::image::read_image;
use isa32::machine::{Machine, RunOutcome};

/// Runs a program image, optionally under a BIOS image, until it halts.
#[derive(Parser, Debug)]
#[command(name = "isa32-emu", version)]
struct Args {
  /// Program image, loaded at the start of RAM
  program: PathBuf,

  /// BIOS image, loaded at the start of ROM. Execution then starts in BIOS mode.
  bios: Option<PathBuf>,

  /// Stop with an error after this many cycles
  #[arg(long)]
  max_cycles: Option<u64>,

  /// Cycles between timer interrupts; 0 disables the timer
  #[arg(long, default_value_t = DEFAULT_TIMER_PERIOD)]
  timer_period: u64,

  /// Print the CPU state when the machine stops
  #[arg(long)]
  dump: bool,

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

  let config = MachineConfig{ timer_period: args.timer_period, ..MachineConfig::default() };
  let mut machine = Machine::new(config).context("invalid machine configuration")?;

  let program =
    read_image(&args.program, config.ram_words)
      .with_context(|| format!("loading {}", args.program.display()))?;
  machine.load_program(&program)?;

  if let Some(bios) = &args.bios {
    let words =
      read_image(bios, config.rom_words)
        .with_context(|| format!("loading {}", bios.display()))?;
    machine.load_bios(&words)?;
  }

  let outcome =
    match args.max_cycles {
      Some(max_cycles) => machine.run_for(max_cycles),
      None             => machine.run().map(|_| RunOutcome::Halted)
    };

  if args.dump {
    println!("{}", machine.snapshot());
  }

  match outcome {
    Ok(RunOutcome::Halted) => {
      info!("halted after {} cycles", machine.cpu().cycle);
      Ok(())
    }

    Ok(RunOutcome::BudgetExhausted) => {
      bail!("still running after {} cycles", machine.cpu().cycle)
    }

    Err(fault) => Err(anyhow!(fault).context("machine faulted")),
  }
}
