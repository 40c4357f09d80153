/*!
  This module is responsible for the encoding and decoding of binary instructions.

*/

use thiserror::Error;

use super::{Instruction, Operation, Family, Register, Source};
use crate::bitfield::BitField;

// If you change this you must also change `layout`.
pub type Word = u32;

/// Bit positions of every instruction field. See the module documentation of `bytecode`.
pub mod layout {
  use crate::bitfield::BitField;

  pub const OPCODE       : BitField = BitField::new(26, 6);
  pub const RD           : BitField = BitField::new(22, 4);
  pub const RS           : BitField = BitField::new(18, 4);
  pub const RT           : BitField = BitField::new(14, 4);

  /// I family: set when the instruction has no base register.
  pub const I_ABSOLUTE   : BitField = BitField::new(16, 1);
  pub const I_IMMEDIATE  : BitField = BitField::new(0, 16);

  /// RI family: set when the second operand is an immediate rather than `Rt`.
  pub const RI_FLAG      : BitField = BitField::new(0, 1);
  pub const RI_IMMEDIATE : BitField = BitField::new(2, 16);

  pub const M_OFFSET     : BitField = BitField::new(0, 24);
}

#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum DecodeError {
  #[error("illegal opcode 0x{0:02X}")]
  IllegalOpcode(u8)
}

fn register_field(field: BitField, word: Word) -> Register {
  field.extract(word) as Register
}

/// Decodes one instruction word. Only the opcode is validated; reserved bits are ignored.
pub fn try_decode_instruction(word: Word) -> Result<Instruction, DecodeError> {
  let opcode    = layout::OPCODE.extract(word) as u8;
  let operation = Operation::try_from(opcode).map_err(|_| DecodeError::IllegalOpcode(opcode))?;

  let instruction =
    match operation.family() {

      Family::R => {
        Instruction::Register {
          operation,
          rd: register_field(layout::RD, word),
          rs: register_field(layout::RS, word),
          rt: register_field(layout::RT, word)
        }
      }

      Family::I => {
        let base =
          match layout::I_ABSOLUTE.is_set(word) {
            true  => None,
            false => Some(register_field(layout::RS, word))
          };
        Instruction::Immediate {
          operation,
          rd: register_field(layout::RD, word),
          base,
          immediate: layout::I_IMMEDIATE.extract(word) as u16 as i16
        }
      }

      Family::RI => {
        let source =
          match layout::RI_FLAG.is_set(word) {
            true  => Source::Immediate(layout::RI_IMMEDIATE.extract(word) as u16 as i16),
            false => Source::Register(register_field(layout::RT, word))
          };
        Instruction::RegisterImmediate {
          operation,
          rd: register_field(layout::RD, word),
          rs: register_field(layout::RS, word),
          source
        }
      }

      Family::M => {
        Instruction::Branch {
          operation,
          offset: layout::M_OFFSET.extract_signed(word)
        }
      }

    };

  Ok(instruction)
}

/**
  Encodes the instruction into a word. It is the caller's responsibility to use the `Instruction`
  variant matching the operation's family and to keep branch offsets within 24 bits; fields are
  truncated to their width.
*/
pub fn encode_instruction(instruction: &Instruction) -> Word {
  let word = layout::OPCODE.insert(0, instruction.operation().code() as Word);

  match *instruction {

    Instruction::Register{ rd, rs, rt, .. } => {
      let word = layout::RD.insert(word, rd as Word);
      let word = layout::RS.insert(word, rs as Word);
      layout::RT.insert(word, rt as Word)
    }

    Instruction::Immediate{ rd, base, immediate, .. } => {
      let word = layout::RD.insert(word, rd as Word);
      let word =
        match base {
          Some(base) => layout::RS.insert(word, base as Word),
          None       => layout::I_ABSOLUTE.insert(word, 1)
        };
      layout::I_IMMEDIATE.insert(word, immediate as u16 as Word)
    }

    Instruction::RegisterImmediate{ rd, rs, source, .. } => {
      let word = layout::RD.insert(word, rd as Word);
      let word = layout::RS.insert(word, rs as Word);
      match source {
        Source::Register(rt)        => layout::RT.insert(word, rt as Word),
        Source::Immediate(immediate) => {
          let word = layout::RI_IMMEDIATE.insert(word, immediate as u16 as Word);
          layout::RI_FLAG.insert(word, 1)
        }
      }
    }

    Instruction::Branch{ offset, .. } => {
      layout::M_OFFSET.insert(word, offset as Word)
    }

  }
}
