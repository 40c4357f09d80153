/*!

  The machine uses a 32 bit word for both instructions and data, and every instruction is exactly
  one word. Memory is word addressed. The top six bits of every instruction word hold the opcode;
  the rest of the word is laid out according to the opcode's *family*:

    R:   [OpCode:6][Rd:4][Rs:4][Rt:4][Reserved:14]
    I:   [OpCode:6][Rd:4][Rb:4][Reserved:1][Abs:1][Immediate:16]
    RI:  [OpCode:6][Rd:4][Rs:4][Rt:4][Reserved:13][Flag:1]       (Flag = 0)
         [OpCode:6][Rd:4][Rs:4][Immediate:16][Reserved:1][Flag:1] (Flag = 1)
    M:   [OpCode:6][Reserved:2][Offset:24]

  Immediates are two's complement and sign extended on use. Branch offsets are measured in words
  from the address following the branch.

  The `Operation` enum is the single source of truth for the instruction set: its discriminants
  are the opcodes, `strum` provides the mnemonics, and `Operation::syntax()` provides the operand
  shape. Both the assembler and the machine dispatch on it.

*/

pub mod assembly;
mod binary;
mod instruction;

pub use binary::{encode_instruction, try_decode_instruction, DecodeError, Word, layout};
pub use instruction::{Instruction, Source};

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use lazy_static::lazy_static;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::IntoEnumIterator;
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};

/// Index of a general purpose register.
pub type Register = u8;

pub const REGISTER_COUNT: usize = 16;
/// Opcodes are six bits wide.
pub const OPCODE_LIMIT: usize = 64;

/**
  Opcodes of the virtual machine.

  Gaps in the numbering are illegal opcodes. Mnemonics are matched without regard to case, and a
  few operations accept an alternative spelling.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq, Debug,           Hash
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[repr(u8)]
pub enum Operation {
  Nop  = 0x00,
  Mov  = 0x01,
  Add  = 0x02,
  Sub  = 0x03,
  And  = 0x04,
  Or   = 0x05,
  Xor  = 0x06,
  #[strum(to_string = "LSL", serialize = "SHL")]
  Lsl  = 0x07,
  #[strum(to_string = "LSR", serialize = "SHR")]
  Lsr  = 0x08,
  Asr  = 0x09,
  Ldr  = 0x0A,
  Str  = 0x0B,
  Cmp  = 0x0C,
  Jmp  = 0x0D,
  Not  = 0x0E,
  #[strum(to_string = "JE", serialize = "JZ")]
  Je   = 0x0F,
  #[strum(to_string = "JNE", serialize = "JNZ")]
  Jne  = 0x10,
  Jc   = 0x11,
  Jnc  = 0x12,
  Jg   = 0x13,
  Jl   = 0x14,
  Push = 0x15,
  Pop  = 0x16,
  #[strum(to_string = "HLT", serialize = "HALT")]
  Hlt  = 0x17,
  Ldi  = 0x18,
  Mul  = 0x1A,
  Div  = 0x1B,
  Mod  = 0x1C,
  Test = 0x1E,
  Int  = 0x1F,
  Call = 0x20,
  Ret  = 0x21,
  Iret = 0x22,
  Ei   = 0x23,
  Di   = 0x24,
}

/// The encoding shape of an instruction word.
#[derive(StrumDisplay, Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Family {
  R,
  I,
  RI,
  M
}

/// The operands an operation takes in assembly, in order.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Syntax {
  /// `HLT`
  Nullary,
  /// `NOT Rd, Rs`
  RegReg,
  /// `MOV Rd, Rs|#imm`
  RegSource,
  /// `ADD Rd, Rs, Rt|#imm`, or `ADD Rd, Rt|#imm` meaning `ADD Rd, Rd, Rt|#imm`
  RegRegSource,
  /// `LDI Rd, #imm`
  RegImmediate,
  /// `LDR Rd, Rb, #imm` or `LDR Rd, #imm`
  RegAddress,
  /// `PUSH #mask` or `PUSH R1, R2, ...`
  Mask,
  /// `INT #n`
  Immediate,
  /// `JMP $label`
  Target
}

impl Syntax {
  pub fn family(&self) -> Family {
    match self {
      Syntax::Nullary | Syntax::RegReg                                  => Family::R,
      Syntax::RegSource | Syntax::RegRegSource                          => Family::RI,
      Syntax::RegImmediate | Syntax::RegAddress
      | Syntax::Mask | Syntax::Immediate                                => Family::I,
      Syntax::Target                                                    => Family::M,
    }
  }

  /// The maximum number of operands written in assembly. A register list given to `PUSH` counts
  /// as the single mask operand.
  pub fn operand_count(&self) -> usize {
    match self {
      Syntax::Nullary                                     => 0,
      Syntax::Mask | Syntax::Immediate | Syntax::Target   => 1,
      Syntax::RegReg | Syntax::RegSource
      | Syntax::RegImmediate                              => 2,
      Syntax::RegRegSource | Syntax::RegAddress           => 3,
    }
  }

  /// Operand summary used in diagnostics.
  pub fn usage(&self) -> &'static str {
    match self {
      Syntax::Nullary      => "no operands",
      Syntax::RegReg       => "Rd, Rs",
      Syntax::RegSource    => "Rd, Rs|#imm",
      Syntax::RegRegSource => "Rd, [Rs,] Rt|#imm",
      Syntax::RegImmediate => "Rd, #imm",
      Syntax::RegAddress   => "Rd, [Rb,] #imm|$label",
      Syntax::Mask         => "#mask or a register list",
      Syntax::Immediate    => "#n",
      Syntax::Target       => "$label or #offset",
    }
  }
}

impl Operation {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  pub fn mnemonic(&self) -> &'static str {
    self.into()
  }

  pub fn syntax(&self) -> Syntax {
    use Operation::*;
    match self {
      Nop | Hlt | Ret | Iret | Ei | Di                          => Syntax::Nullary,
      Not                                                       => Syntax::RegReg,
      Mov | Cmp | Test                                          => Syntax::RegSource,
      Add | Sub | And | Or | Xor | Lsl | Lsr | Asr
      | Mul | Div | Mod                                         => Syntax::RegRegSource,
      Ldi                                                       => Syntax::RegImmediate,
      Ldr | Str                                                 => Syntax::RegAddress,
      Push | Pop                                                => Syntax::Mask,
      Int                                                       => Syntax::Immediate,
      Jmp | Je | Jne | Jc | Jnc | Jg | Jl | Call                => Syntax::Target,
    }
  }

  pub fn family(&self) -> Family {
    self.syntax().family()
  }

  pub fn descriptor(&self) -> Descriptor {
    let syntax = self.syntax();
    Descriptor {
      operation     : *self,
      mnemonic      : self.mnemonic(),
      family        : syntax.family(),
      opcode        : self.code(),
      operand_count : syntax.operand_count(),
      syntax
    }
  }
}

/// Static description of one instruction: what the assembler needs to parse it and what the
/// machine needs to decode it.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct Descriptor {
  pub operation     : Operation,
  pub mnemonic      : &'static str,
  pub family        : Family,
  pub opcode        : u8,
  pub operand_count : usize,
  pub syntax        : Syntax
}

impl Display for Descriptor {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} (0x{:02X}, {}, {} operands)", self.mnemonic, self.opcode, self.family, self.operand_count)
  }
}

lazy_static! {
  /// Sparse opcode table indexed by opcode. Unpopulated slots are illegal opcodes.
  static ref OPCODE_TABLE: [Option<Descriptor>; OPCODE_LIMIT] = {
    let mut table = [None; OPCODE_LIMIT];
    for operation in Operation::iter() {
      table[operation.code() as usize] = Some(operation.descriptor());
    }
    table
  };
}

/// Case-insensitive lookup of a mnemonic or one of its alternative spellings.
pub fn lookup_by_name(name: &str) -> Option<Descriptor> {
  Operation::from_str(name).ok().map(|operation| operation.descriptor())
}

pub fn lookup_by_opcode(opcode: u8) -> Option<Descriptor> {
  OPCODE_TABLE.get(opcode as usize).copied().flatten()
}

/// Iterates the live entries of the opcode table in opcode order.
pub fn descriptors() -> impl Iterator<Item = Descriptor> {
  OPCODE_TABLE.iter().filter_map(|slot| *slot)
}


#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  #[test]
  fn opcodes_fit_six_bits_and_are_unique() {
    let mut seen = HashSet::new();
    for operation in Operation::iter() {
      assert!((operation.code() as usize) < OPCODE_LIMIT, "{} out of range", operation);
      assert!(seen.insert(operation.code()), "{} reuses an opcode", operation);
    }
    assert!(seen.len() <= OPCODE_LIMIT);
  }

  #[test]
  fn lookup_is_case_insensitive() {
    let add = lookup_by_name("add").unwrap();
    assert_eq!(add.operation, Operation::Add);
    assert_eq!(lookup_by_name("AdD"), Some(add));
    assert_eq!(lookup_by_name("halt").unwrap().operation, Operation::Hlt);
    assert_eq!(lookup_by_name("jz").unwrap().mnemonic, "JE");
    assert_eq!(lookup_by_name("FROB"), None);
  }

  #[test]
  fn opcode_lookup_agrees_with_name_lookup() {
    for descriptor in descriptors() {
      assert_eq!(lookup_by_opcode(descriptor.opcode), Some(descriptor));
      assert_eq!(lookup_by_name(descriptor.mnemonic), Some(descriptor));
    }
    assert_eq!(lookup_by_opcode(0x19), None);
    assert_eq!(lookup_by_opcode(0x3F), None);
    assert_eq!(lookup_by_opcode(0xFF), None);
  }

  #[test]
  fn families_follow_syntax() {
    assert_eq!(Operation::Hlt.family(), Family::R);
    assert_eq!(Operation::Mov.family(), Family::RI);
    assert_eq!(Operation::Ldr.family(), Family::I);
    assert_eq!(Operation::Call.family(), Family::M);
    assert_eq!(Operation::Add.descriptor().operand_count, 3);
    assert_eq!(Operation::Push.descriptor().operand_count, 1);
  }
}
