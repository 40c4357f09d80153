//! A word address qualified by the memory region it points into, with some convenience functions.

use std::ops::Add;
use std::fmt::{Display, Formatter};

use crate::bytecode::Word;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum Region {
  /// Read-only memory holding the BIOS and the interrupt vector table.
  Rom,
  /// Read-write memory holding the loaded program, its data, the framebuffer and the stack.
  Ram
}

impl Display for Region {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Region::Rom => write!(f, "ROM"),
      Region::Ram => write!(f, "RAM")
    }
  }
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct Address {
  pub region : Region,
  pub index  : Word
}

impl Address {
  pub fn rom(index: Word) -> Address {
    Address{ region: Region::Rom, index }
  }

  pub fn ram(index: Word) -> Address {
    Address{ region: Region::Ram, index }
  }

  /// Converts the address to an index into the region's vector.
  pub fn idx(&self) -> usize {
    self.index as usize
  }
}

impl Display for Address {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}[0x{:04X}]", self.region, self.index)
  }
}

// Increment an address within its region. Wraps like the machine's address arithmetic.
impl Add<Word> for Address {
  type Output = Address;
  fn add(self, rhs: Word) -> Address {
    Address{ region: self.region, index: self.index.wrapping_add(rhs) }
  }
}
