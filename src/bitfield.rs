/*!
  Bit range helpers. Every instruction field is described by a `BitField`, a shift and a width,
  so that the layout of an instruction word lives in one table of constants instead of being
  scattered across shift expressions.
*/

use crate::bytecode::Word;

/// A contiguous range of bits `[shift + width - 1 : shift]` within a `Word`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct BitField {
  pub shift : u32,
  pub width : u32
}

impl BitField {

  pub const fn new(shift: u32, width: u32) -> BitField {
    BitField{ shift, width }
  }

  /// The mask of the field *before* shifting, i.e. the low `width` bits.
  pub const fn mask(&self) -> Word {
    if self.width >= Word::BITS {
      Word::MAX
    } else {
      (1 << self.width) - 1
    }
  }

  /// The index of the highest bit covered by the field.
  pub const fn high_bit(&self) -> u32 {
    self.shift + self.width - 1
  }

  pub fn extract(&self, word: Word) -> Word {
    (word >> self.shift) & self.mask()
  }

  /// Extracts the field and sign-extends it from its own width to 32 bits.
  pub fn extract_signed(&self, word: Word) -> i32 {
    sign_extend(self.extract(word), self.width)
  }

  /// Returns `word` with the field replaced by the low `width` bits of `value`. Higher bits of
  /// `value` are chopped off.
  pub fn insert(&self, word: Word, value: Word) -> Word {
    let mask = self.mask() << self.shift;
    (word & !mask) | ((value << self.shift) & mask)
  }

  pub fn is_set(&self, word: Word) -> bool {
    self.extract(word) != 0
  }

  /// Whether `value` is representable as a signed integer of this field's width.
  pub fn fits_signed(&self, value: i64) -> bool {
    let half = 1i64 << (self.width - 1);
    (-half..half).contains(&value)
  }
}

/// Treats the low `bits` bits of `value` as a two's complement integer.
pub fn sign_extend(value: Word, bits: u32) -> i32 {
  if bits == 0 {
    return 0;
  }
  if bits >= Word::BITS {
    return value as i32;
  }
  let unused = Word::BITS - bits;
  ((value << unused) as i32) >> unused
}


#[cfg(test)]
mod tests {
  use super::*;

  const LOW_NIBBLE  : BitField = BitField::new(0, 4);
  const HIGH_BYTE   : BitField = BitField::new(24, 8);
  const MIDDLE_HALF : BitField = BitField::new(2, 16);

  #[test]
  fn extracts_fields() {
    assert_eq!(LOW_NIBBLE.extract(0xABCD_1234), 0x4);
    assert_eq!(HIGH_BYTE.extract(0xABCD_1234), 0xAB);
    assert_eq!(MIDDLE_HALF.extract(0xFFFF << 2 | 0b11), 0xFFFF);
  }

  #[test]
  fn sign_extends_narrow_values() {
    assert_eq!(sign_extend(0xFFFF, 16), -1);
    assert_eq!(sign_extend(0x7FFF, 16), 0x7FFF);
    assert_eq!(sign_extend(0x80_0000, 24), -0x80_0000);
    assert_eq!(sign_extend(0x12, 32), 0x12);
    assert_eq!(MIDDLE_HALF.extract_signed(0x8000 << 2), -0x8000);
  }

  #[test]
  fn insert_preserves_neighbours() {
    let word = 0xFFFF_FFFF;
    let word = LOW_NIBBLE.insert(word, 0);
    assert_eq!(word, 0xFFFF_FFF0);
    // Bits above the field width are dropped rather than leaking into the neighbour.
    assert_eq!(LOW_NIBBLE.insert(0, 0x1F), 0xF);
    assert_eq!(HIGH_BYTE.insert(0x00FF_FFFF, 0x12), 0x12FF_FFFF);
  }

  #[test]
  fn signed_ranges() {
    let field = BitField::new(0, 24);
    assert!(field.fits_signed(0x7F_FFFF));
    assert!(field.fits_signed(-0x80_0000));
    assert!(!field.fits_signed(0x80_0000));
    assert!(!field.fits_signed(-0x80_0001));
    assert_eq!(field.high_bit(), 23);
  }
}
