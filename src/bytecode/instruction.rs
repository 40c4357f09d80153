use std::fmt::{Display, Formatter};

use super::{Family, Operation, Register, Syntax, REGISTER_COUNT};

/// The second operand of an RI instruction: either a register or a 16 bit immediate, selected by
/// the immediate flag bit.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Source {
  Register(Register),
  Immediate(i16)
}

impl Display for Source {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Source::Register(r)  => write!(f, "R{}", r),
      Source::Immediate(i) => write!(f, "#{}", i),
    }
  }
}

/// Holds the unencoded components of an instruction. There is one variant per encoding family.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Instruction {
  /// [OpCode:6][Rd:4][Rs:4][Rt:4][Reserved:14]
  Register {
    operation : Operation,
    rd        : Register,
    rs        : Register,
    rt        : Register
  },
  /// [OpCode:6][Rd:4][Rb:4][Reserved:1][Abs:1][Immediate:16]
  ///
  /// `base` is `None` when the immediate is used on its own (the `Abs` bit).
  Immediate {
    operation : Operation,
    rd        : Register,
    base      : Option<Register>,
    immediate : i16
  },
  /// [OpCode:6][Rd:4][Rs:4][Rt:4 | Immediate:16][Flag:1]
  RegisterImmediate {
    operation : Operation,
    rd        : Register,
    rs        : Register,
    source    : Source
  },
  /// [OpCode:6][Reserved:2][Offset:24]
  Branch {
    operation : Operation,
    offset    : i32
  },
}

impl Instruction {

  /// An R family instruction with no operands.
  pub fn nullary(operation: Operation) -> Instruction {
    Instruction::Register{ operation, rd: 0, rs: 0, rt: 0 }
  }

  pub fn operation(&self) -> Operation {
    match self {
      | Instruction::Register{ operation, .. }
      | Instruction::Immediate{ operation, .. }
      | Instruction::RegisterImmediate{ operation, .. }
      | Instruction::Branch{ operation, .. } => *operation
    }
  }

  pub fn family(&self) -> Family {
    match self {
      Instruction::Register{ .. }          => Family::R,
      Instruction::Immediate{ .. }         => Family::I,
      Instruction::RegisterImmediate{ .. } => Family::RI,
      Instruction::Branch{ .. }            => Family::M,
    }
  }
}

/// Formats a `PUSH`/`POP` mask as the register list it selects.
fn write_mask(f: &mut Formatter<'_>, mask: u16) -> std::fmt::Result {
  if mask == 0 {
    return write!(f, "#0");
  }
  let registers: Vec<String> =
    (0..REGISTER_COUNT)
      .filter(|bit| mask & (1 << bit) != 0)
      .map(|bit| format!("R{}", bit))
      .collect();
  write!(f, "{}", registers.join(", "))
}

/// Writes the instruction as assembly that assembles back to the same word.
impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match *self {

      Instruction::Register{ operation, rd, rs, .. } => {
        match operation.syntax() {
          Syntax::RegReg => write!(f, "{} R{}, R{}", operation, rd, rs),
          _              => write!(f, "{}", operation)
        }
      }

      Instruction::Immediate{ operation, rd, base, immediate } => {
        match (operation.syntax(), base) {
          (Syntax::RegAddress, Some(base)) => write!(f, "{} R{}, R{}, #{}", operation, rd, base, immediate),
          (Syntax::RegAddress, None)       => write!(f, "{} R{}, #{}", operation, rd, immediate),
          (Syntax::Mask, _)                => {
            write!(f, "{} ", operation)?;
            write_mask(f, immediate as u16)
          }
          (Syntax::Immediate, _)           => write!(f, "{} #{}", operation, immediate as u16),
          _                                => write!(f, "{} R{}, #{}", operation, rd, immediate),
        }
      }

      Instruction::RegisterImmediate{ operation, rd, rs, source } => {
        match operation.syntax() {
          Syntax::RegRegSource => write!(f, "{} R{}, R{}, {}", operation, rd, rs, source),
          _                    => write!(f, "{} R{}, {}", operation, rd, source),
        }
      }

      Instruction::Branch{ operation, offset } => {
        write!(f, "{} #{}", operation, offset)
      }

    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn displays_assembly_syntax() {
    let add = Instruction::RegisterImmediate {
      operation: Operation::Add, rd: 1, rs: 2, source: Source::Immediate(-5)
    };
    assert_eq!(add.to_string(), "ADD R1, R2, #-5");

    let mov = Instruction::RegisterImmediate {
      operation: Operation::Mov, rd: 3, rs: 0, source: Source::Register(4)
    };
    assert_eq!(mov.to_string(), "MOV R3, R4");

    let ldr = Instruction::Immediate {
      operation: Operation::Ldr, rd: 0, base: None, immediate: 12
    };
    assert_eq!(ldr.to_string(), "LDR R0, #12");

    let push = Instruction::Immediate {
      operation: Operation::Push, rd: 0, base: None, immediate: 0b1010
    };
    assert_eq!(push.to_string(), "PUSH R1, R3");

    assert_eq!(Instruction::nullary(Operation::Hlt).to_string(), "HLT");
    assert_eq!(
      Instruction::Branch{ operation: Operation::Jne, offset: -3 }.to_string(),
      "JNE #-3"
    );
  }

  #[test]
  fn reports_family() {
    assert_eq!(Instruction::nullary(Operation::Ret).family(), Family::R);
    assert_eq!(Instruction::Branch{ operation: Operation::Call, offset: 0 }.operation(), Operation::Call);
  }
}
