/*!
  Machine configuration: memory sizes, the interrupt vector table, the timer and the framebuffer
  window. `MachineConfig::default()` is the reference machine; front ends override single fields.
*/

use thiserror::Error;

use crate::bytecode::Word;

pub const DEFAULT_RAM_WORDS     : usize = 0x1_0000;
pub const DEFAULT_ROM_WORDS     : usize = 0x1_0000;
pub const DEFAULT_VECTOR_BASE   : Word  = 0x10;
pub const DEFAULT_VECTOR_COUNT  : u16   = 16;
pub const DEFAULT_TIMER_PERIOD  : u64   = 1000;
/// Words per interrupt vector: the handler address and a flags word.
pub const VECTOR_WORDS          : Word  = 2;

/// A memory-mapped pixel window in RAM, one word per pixel, row major.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FramebufferConfig {
  pub base   : Word,
  pub width  : usize,
  pub height : usize
}

impl Default for FramebufferConfig {
  fn default() -> Self {
    FramebufferConfig {
      base   : 0x8000,
      width  : 64,
      height : 48
    }
  }
}

impl FramebufferConfig {
  pub fn len(&self) -> usize {
    self.width * self.height
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// The row of the window containing `address`, if any.
  pub fn row_of(&self, address: Word) -> Option<usize> {
    let offset = address.checked_sub(self.base)? as usize;
    match offset < self.len() {
      true  => Some(offset / self.width),
      false => None
    }
  }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MachineConfig {
  pub ram_words    : usize,
  pub rom_words    : usize,
  /// First ROM word of the interrupt vector table.
  pub vector_base  : Word,
  pub vector_count : u16,
  /// Cycles between timer interrupts. Zero disables the timer.
  pub timer_period : u64,
  /// Lowest value `sp` may reach. A push that would go below it overflows the stack.
  pub stack_limit  : Word,
  pub framebuffer  : FramebufferConfig
}

impl Default for MachineConfig {
  fn default() -> Self {
    MachineConfig {
      ram_words    : DEFAULT_RAM_WORDS,
      rom_words    : DEFAULT_ROM_WORDS,
      vector_base  : DEFAULT_VECTOR_BASE,
      vector_count : DEFAULT_VECTOR_COUNT,
      timer_period : DEFAULT_TIMER_PERIOD,
      stack_limit  : 0,
      framebuffer  : FramebufferConfig::default()
    }
  }
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ConfigError {
  #[error("RAM must hold between 1 and 2^32 - 1 words, not {0}")]
  RamSize(usize),
  #[error("the vector table (0x{base:X}, {count} vectors) does not fit in {rom_words} words of ROM")]
  VectorTable { base: Word, count: u16, rom_words: usize },
  #[error("the framebuffer window (0x{base:X}, {len} words) does not fit in {ram_words} words of RAM")]
  Framebuffer { base: Word, len: usize, ram_words: usize },
  #[error("the stack limit 0x{limit:X} is beyond the top of RAM")]
  StackLimit { limit: Word },
}

impl MachineConfig {
  /// Checks that every fixed region fits in the memory it lives in.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.ram_words == 0 || self.ram_words > Word::MAX as usize {
      return Err(ConfigError::RamSize(self.ram_words));
    }

    let vector_end = self.vector_base as usize + self.vector_count as usize * VECTOR_WORDS as usize;
    if vector_end > self.rom_words {
      return Err(ConfigError::VectorTable{
        base      : self.vector_base,
        count     : self.vector_count,
        rom_words : self.rom_words
      });
    }

    let framebuffer_end = self.framebuffer.base as usize + self.framebuffer.len();
    if framebuffer_end > self.ram_words {
      return Err(ConfigError::Framebuffer{
        base      : self.framebuffer.base,
        len       : self.framebuffer.len(),
        ram_words : self.ram_words
      });
    }

    if self.stack_limit as usize > self.ram_words {
      return Err(ConfigError::StackLimit{ limit: self.stack_limit });
    }

    Ok(())
  }

  /// The initial stack pointer: one past the last RAM word.
  pub fn stack_top(&self) -> Word {
    self.ram_words as Word
  }
}
