/*!
  The two word arrays of the machine. ROM holds the BIOS and the interrupt vector table; RAM holds
  the program, its data, the framebuffer window and the stack. Every access is bounds checked
  against the region it names.
*/

use std::ops::Range;

use thiserror::Error;

use crate::address::{Address, Region};
use crate::bytecode::Word;
use crate::config::{FramebufferConfig, MachineConfig, VECTOR_WORDS};

/// Bit 0 of a vector's flags word marks the vector as installed.
pub const VECTOR_PRESENT: Word = 1;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum MemoryError {
  #[error("{address} is outside the region")]
  OutOfBounds { address: Address },
  #[error("{len} words do not fit in {capacity} words of {region}")]
  TooLarge { region: Region, len: usize, capacity: usize },
  #[error("range {start}..{end} is outside {region} ({len} words)")]
  InvalidRange { region: Region, start: usize, end: usize, len: usize },
}

/// Receives the contents of a framebuffer row after a program stores into it.
pub trait FramebufferObserver {
  fn on_framebuffer_write(&mut self, row: usize, pixels: &[Word]);
}

impl<F> FramebufferObserver for F
  where F: FnMut(usize, &[Word])
{
  fn on_framebuffer_write(&mut self, row: usize, pixels: &[Word]) {
    self(row, pixels)
  }
}

pub struct MemorySpace {
  rom : Vec<Word>,
  ram : Vec<Word>
}

impl MemorySpace {

  pub fn new(config: &MachineConfig) -> MemorySpace {
    MemorySpace {
      rom : vec![0; config.rom_words],
      ram : vec![0; config.ram_words]
    }
  }

  pub fn region(&self, region: Region) -> &[Word] {
    match region {
      Region::Rom => &self.rom,
      Region::Ram => &self.ram
    }
  }

  fn region_mut(&mut self, region: Region) -> &mut [Word] {
    match region {
      Region::Rom => &mut self.rom,
      Region::Ram => &mut self.ram
    }
  }

  pub fn len(&self, region: Region) -> usize {
    self.region(region).len()
  }

  /// Copies `words` to the start of `region`. The rest of the region is left as it was.
  pub fn load(&mut self, region: Region, words: &[Word]) -> Result<(), MemoryError> {
    let capacity = self.len(region);
    if words.len() > capacity {
      return Err(MemoryError::TooLarge{ region, len: words.len(), capacity });
    }
    self.region_mut(region)[..words.len()].copy_from_slice(words);
    Ok(())
  }

  pub fn read(&self, address: Address) -> Result<Word, MemoryError> {
    self.region(address.region)
        .get(address.idx())
        .copied()
        .ok_or(MemoryError::OutOfBounds{ address })
  }

  pub fn write(&mut self, address: Address, value: Word) -> Result<(), MemoryError> {
    match self.region_mut(address.region).get_mut(address.idx()) {
      Some(cell) => {
        *cell = value;
        Ok(())
      }
      None => Err(MemoryError::OutOfBounds{ address })
    }
  }

  pub fn read_range(&self, region: Region, range: Range<usize>) -> Result<&[Word], MemoryError> {
    let words = self.region(region);
    words.get(range.clone()).ok_or(MemoryError::InvalidRange{
      region,
      start : range.start,
      end   : range.end,
      len   : words.len()
    })
  }

  /// The handler address of vector `number`, or `None` if the vector is not installed.
  pub fn vector(&self, base: Word, number: u16) -> Result<Option<Word>, MemoryError> {
    let entry   = Address::rom(base) + number as Word * VECTOR_WORDS;
    let handler = self.read(entry)?;
    let flags   = self.read(entry + 1)?;
    match flags & VECTOR_PRESENT {
      0 => Ok(None),
      _ => Ok(Some(handler))
    }
  }

  /// Installs `handler` as vector `number`. Used by loaders and tests; programs cannot write ROM.
  pub fn set_vector(&mut self, base: Word, number: u16, handler: Word) -> Result<(), MemoryError> {
    let entry = Address::rom(base) + number as Word * VECTOR_WORDS;
    self.write(entry, handler)?;
    self.write(entry + 1, VECTOR_PRESENT)
  }

  /// The RAM words of framebuffer row `row`.
  pub fn framebuffer_row(&self, framebuffer: &FramebufferConfig, row: usize) -> Result<&[Word], MemoryError> {
    let start = framebuffer.base as usize + row * framebuffer.width;
    self.read_range(Region::Ram, start..start + framebuffer.width)
  }
}
