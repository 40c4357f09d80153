//! Assembly errors and runtime faults.

use thiserror::Error;

use crate::address::Region;
use crate::bytecode::Word;

/// How many known labels an `UnknownLabel` error lists.
pub const KNOWN_LABEL_LIMIT: usize = 8;

fn list_known(known: &[String], total: &usize) -> String {
  if known.is_empty() {
    return "no labels are defined".to_string();
  }
  let mut text = format!("known labels: {}", known.join(", "));
  if *total > known.len() {
    text.push_str(&format!(" (and {} more)", total - known.len()));
  }
  text
}

/// What went wrong on a line of assembly.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum AssembleErrorKind {
  #[error("unknown mnemonic `{0}`")]
  UnknownMnemonic(String),

  #[error("unknown label `{name}`; {}", list_known(.known, .total))]
  UnknownLabel {
    name  : String,
    known : Vec<String>,
    total : usize
  },

  #[error("invalid register `{token}`: expected R0 through R15")]
  InvalidRegister { token: String },

  #[error("invalid operand `{token}`: expected {expected}")]
  InvalidImmediate {
    token    : String,
    expected : &'static str
  },

  #[error("label `{name}` is already defined on line {first_line}")]
  DuplicateLabel {
    name       : String,
    first_line : usize
  },

  #[error("`{token}` is {offset} words away, which does not fit a {bits} bit signed offset")]
  OffsetOutOfRange {
    token  : String,
    offset : i64,
    bits   : u32
  },

  #[error("{mnemonic} expects `{usage}` but was given {found} operand(s)")]
  WrongOperandCount {
    mnemonic : &'static str,
    usage    : &'static str,
    found    : usize
  },

  #[error("`{0}` is not a valid label name")]
  MalformedLabel(String),
}

/// A fatal assembly error, scoped to one source line.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("line {line}: {kind}\n    {text}")]
pub struct AssembleError {
  /// 1-based line number.
  pub line : usize,
  /// The offending line as written.
  pub text : String,
  pub kind : AssembleErrorKind
}

/**
  A fault raised while executing. Faults halt the machine. `pc` is always the address of the
  instruction that faulted, or the interrupted address for a fault raised while dispatching a
  hardware interrupt.
*/
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum RuntimeFault {
  #[error("illegal opcode 0x{opcode:02X} at pc 0x{pc:04X}")]
  IllegalOpcode { opcode: u8, pc: Word },

  #[error("division by zero at pc 0x{pc:04X}")]
  DivisionByZero { pc: Word },

  #[error("stack overflow at pc 0x{pc:04X} (sp 0x{sp:04X})")]
  StackOverflow { pc: Word, sp: Word },

  #[error("stack underflow at pc 0x{pc:04X} (sp 0x{sp:04X})")]
  StackUnderflow { pc: Word, sp: Word },

  #[error("address {address:#X} is outside {region} at pc 0x{pc:04X}")]
  MemoryOutOfBounds { pc: Word, region: Region, address: i64 },

  #[error("no handler for interrupt {number} at pc 0x{pc:04X}")]
  InvalidInterruptNumber { pc: Word, number: u16 },

  #[error("interrupt frame holds invalid mode {value} at pc 0x{pc:04X}")]
  InvalidMode { pc: Word, value: Word },
}

impl RuntimeFault {
  pub fn pc(&self) -> Word {
    match *self {
      | RuntimeFault::IllegalOpcode{ pc, .. }
      | RuntimeFault::DivisionByZero{ pc }
      | RuntimeFault::StackOverflow{ pc, .. }
      | RuntimeFault::StackUnderflow{ pc, .. }
      | RuntimeFault::MemoryOutOfBounds{ pc, .. }
      | RuntimeFault::InvalidInterruptNumber{ pc, .. }
      | RuntimeFault::InvalidMode{ pc, .. } => pc
    }
  }
}
