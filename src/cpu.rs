/*!
  The register file and control state of the processor, and a read-only snapshot of it for
  debuggers and front ends.
*/

use std::fmt::{Display, Formatter};

use bitflags::bitflags;
use lazy_static::lazy_static;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use prettytable::{format as TableFormat, row, table, Table};
use strum_macros::Display as StrumDisplay;

use crate::bytecode::{Register, Word, REGISTER_COUNT};
use crate::config::MachineConfig;
use crate::error::RuntimeFault;

bitflags! {
  /// The eight bit flag register.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
  pub struct Flags: u8 {
    const ZERO              = 1 << 0;
    const CARRY             = 1 << 1;
    const NEGATIVE          = 1 << 2;
    const OVERFLOW          = 1 << 3;
    const INTERRUPT_ENABLE  = 1 << 4;
    const INTERRUPT_PENDING = 1 << 5;
  }
}

impl Display for Flags {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let z  = if self.contains(Self::ZERO)              { "Z"  } else { "-"  };
    let c  = if self.contains(Self::CARRY)             { "C"  } else { "-"  };
    let n  = if self.contains(Self::NEGATIVE)          { "N"  } else { "-"  };
    let v  = if self.contains(Self::OVERFLOW)          { "V"  } else { "-"  };
    let ie = if self.contains(Self::INTERRUPT_ENABLE)  { "IE" } else { "--" };
    let ip = if self.contains(Self::INTERRUPT_PENDING) { "IP" } else { "--" };
    write!(f, "{z}{c}{n}{v} {ie} {ip}")
  }
}

/// Privilege mode. BIOS fetches from ROM; KERNEL and USER fetch from RAM.
#[derive(
  StrumDisplay, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,             Eq, PartialEq, Debug, Hash
)]
#[strum(serialize_all = "UPPERCASE")]
#[repr(u8)]
pub enum Mode {
  Bios   = 0,
  Kernel = 1,
  User   = 2,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CpuState {
  pub registers : [Word; REGISTER_COUNT],
  pub pc        : Word,
  pub sp        : Word,
  pub flags     : Flags,
  /// Number of the interrupt latched by `INTERRUPT_PENDING`.
  pub interrupt : u16,
  pub cycle     : u64,
  pub running   : bool,
  pub mode      : Mode
}

impl CpuState {

  /// The power-on state. Execution starts in BIOS mode when a ROM image is present.
  pub fn boot(config: &MachineConfig, has_rom: bool) -> CpuState {
    CpuState {
      registers : [0; REGISTER_COUNT],
      pc        : 0,
      sp        : config.stack_top(),
      flags     : Flags::INTERRUPT_ENABLE,
      interrupt : 0,
      cycle     : 0,
      running   : true,
      mode      : if has_rom { Mode::Bios } else { Mode::Kernel }
    }
  }

  pub fn reg(&self, register: Register) -> Word {
    self.registers[register as usize % REGISTER_COUNT]
  }

  pub fn set_reg(&mut self, register: Register, value: Word) {
    self.registers[register as usize % REGISTER_COUNT] = value;
  }

  pub fn flag(&self, flag: Flags) -> bool {
    self.flags.contains(flag)
  }

  pub fn set_flag(&mut self, flag: Flags, value: bool) {
    self.flags.set(flag, value);
  }

  /// Sets Z and N from `result`, leaving C and V alone.
  pub fn set_result_flags(&mut self, result: Word) {
    self.set_flag(Flags::ZERO,     result == 0);
    self.set_flag(Flags::NEGATIVE, (result as i32) < 0);
  }

  /// Sets Z and N from `result` and clears C and V.
  pub fn set_logic_flags(&mut self, result: Word) {
    self.set_result_flags(result);
    self.set_flag(Flags::CARRY,    false);
    self.set_flag(Flags::OVERFLOW, false);
  }

  /// Sets all condition flags from an addition or subtraction.
  pub fn set_arithmetic_flags(&mut self, result: Word, carry: bool, overflow: bool) {
    self.set_result_flags(result);
    self.set_flag(Flags::CARRY,    carry);
    self.set_flag(Flags::OVERFLOW, overflow);
  }
}

/// A copy of the CPU state handed to debuggers and front ends.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CpuStateView {
  pub cpu        : CpuState,
  pub last_fault : Option<RuntimeFault>
}

impl CpuStateView {

  fn make_register_table(registers: &[Word], changed: &[bool], start: usize) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Contents"]);

    for (i, value) in registers.iter().enumerate() {
      match changed[i] {

        true  => {
          table.add_row(
            row![r->format!("* --> R{} =", i + start), format!("0x{:08X}", value)]
          );
        }

        false => {
          table.add_row(
            row![r->format!("R{} =", i + start), format!("0x{:08X}", value)]
          );
        }

      }
    }
    table
  }

  fn make_status_table(&self) -> Table {
    let cpu = &self.cpu;
    let mut table = Table::new();
    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.add_row(row![r->"PC =",    format!("0x{:04X}", cpu.pc)]);
    table.add_row(row![r->"SP =",    format!("0x{:04X}", cpu.sp)]);
    table.add_row(row![r->"Flags =", cpu.flags]);
    table.add_row(row![r->"Mode =",  cpu.mode]);
    table.add_row(row![r->"Cycle =", cpu.cycle]);
    table.add_row(row![r->"IRQ =",   cpu.interrupt]);
    let state =
      match (cpu.running, &self.last_fault) {
        (true, _)             => "Running".to_string(),
        (false, None)         => "Halted".to_string(),
        (false, Some(fault))  => format!("Faulted: {}", fault),
      };
    table.add_row(row![r->"State =", state]);
    table
  }

  /**
    Renders the state as a table. Registers that differ from `previous` are marked, which lets a
    stepping debugger show what the last instruction changed.
  */
  pub fn render(&self, previous: Option<&CpuStateView>) -> Table {
    let half = REGISTER_COUNT / 2;
    let changed: Vec<bool> =
      (0..REGISTER_COUNT)
        .map(|i| previous.map_or(false, |p| p.cpu.registers[i] != self.cpu.registers[i]))
        .collect();

    let low_table    = Self::make_register_table(&self.cpu.registers[..half], &changed[..half], 0);
    let high_table   = Self::make_register_table(&self.cpu.registers[half..], &changed[half..], half);
    let status_table = self.make_status_table();

    let mut combined_table = table!([low_table, high_table, status_table]);
    combined_table.set_titles(row![ub->"Registers", ub->"", ub->"Status"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);
    combined_table
  }
}

impl Display for CpuStateView {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.render(None))
  }
}

lazy_static! {
  pub(crate) static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}
