/*!
  Program images on disk: a flat sequence of little-endian 32 bit words with no header. The
  assembler writes them and the emulator loads them verbatim into ROM or RAM.
*/

use std::fs;
use std::io::{self, Cursor};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use thiserror::Error;

use crate::bytecode::Word;

const WORD_BYTES: usize = std::mem::size_of::<Word>();

#[derive(Debug, Error)]
pub enum ImageError {
  #[error(transparent)]
  Io(#[from] io::Error),
  #[error("image is {0} bytes long, which is not a whole number of words")]
  Misaligned(usize),
  #[error("image holds {words} words but the region holds only {capacity}")]
  TooLarge { words: usize, capacity: usize },
}

pub fn decode_image(bytes: &[u8]) -> Result<Vec<Word>, ImageError> {
  if bytes.len() % WORD_BYTES != 0 {
    return Err(ImageError::Misaligned(bytes.len()));
  }
  let mut cursor = Cursor::new(bytes);
  let mut words  = Vec::with_capacity(bytes.len() / WORD_BYTES);
  for _ in 0..bytes.len() / WORD_BYTES {
    words.push(cursor.read_u32::<LittleEndian>()?);
  }
  Ok(words)
}

pub fn encode_image(words: &[Word]) -> Vec<u8> {
  let mut bytes = vec![0; words.len() * WORD_BYTES];
  LittleEndian::write_u32_into(words, &mut bytes);
  bytes
}

/// Reads an image destined for a region of `capacity` words.
pub fn read_image<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Vec<Word>, ImageError> {
  let words = decode_image(&fs::read(path)?)?;
  if words.len() > capacity {
    return Err(ImageError::TooLarge{ words: words.len(), capacity });
  }
  Ok(words)
}

pub fn write_image<P: AsRef<Path>>(path: P, words: &[Word]) -> Result<(), ImageError> {
  fs::write(path, encode_image(words))?;
  Ok(())
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn words_are_little_endian() {
    assert_eq!(encode_image(&[0x5C00_0000, 1]), vec![0, 0, 0, 0x5C, 1, 0, 0, 0]);
    assert_eq!(decode_image(&[0x78, 0x56, 0x34, 0x12]).unwrap(), vec![0x1234_5678]);
    assert!(decode_image(&[]).unwrap().is_empty());
    assert!(encode_image(&[]).is_empty());
  }

  #[test]
  fn encoding_covers_every_word() {
    let words: Vec<Word> = (0..300).map(|i| 0x0102_0304u32.wrapping_mul(i)).collect();
    let bytes = encode_image(&words);
    assert_eq!(bytes.len(), words.len() * WORD_BYTES);
    assert_eq!(&bytes[4..8], &0x0102_0304u32.to_le_bytes()[..]);
    assert_eq!(decode_image(&bytes).unwrap(), words);
  }

  #[test]
  fn rejects_partial_words() {
    assert!(matches!(decode_image(&[1, 2, 3]), Err(ImageError::Misaligned(3))));
  }

  #[test]
  fn file_round_trip_and_capacity() {
    let path = std::env::temp_dir().join(format!("isa32-image-test-{}.bin", std::process::id()));
    write_image(&path, &[1, 2, 3]).unwrap();
    assert_eq!(read_image(&path, 3).unwrap(), vec![1, 2, 3]);
    assert!(matches!(read_image(&path, 2), Err(ImageError::TooLarge{ words: 3, capacity: 2 })));
    fs::remove_file(&path).unwrap();
    assert!(matches!(read_image(&path, 2), Err(ImageError::Io(_))));
  }
}
