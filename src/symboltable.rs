use std::collections::{BTreeMap, HashMap};

use string_cache::DefaultAtom;

use crate::bytecode::Word;

/**
  The labels of one assembly source. Maps interned label names to the word offset they designate
  and the line that defined them. Several labels may name the same offset, so the reverse
  direction keeps a list per offset.
*/
#[derive(Default, Debug)]
pub struct SymbolTable {
  table   : HashMap<DefaultAtom, (Word, usize)>,
  offsets : BTreeMap<Word, Vec<DefaultAtom>>
}

impl SymbolTable {

  pub fn new() -> SymbolTable {
    SymbolTable::default()
  }

  pub fn len(&self) -> usize {
    self.table.len()
  }

  pub fn is_empty(&self) -> bool {
    self.table.is_empty()
  }

  pub fn get_offset(&self, name: &str) -> Option<Word> {
    self.table.get(&DefaultAtom::from(name)).map(|(offset, _)| *offset)
  }

  /// The labels defined at `offset`, in definition order.
  pub fn get_labels(&self, offset: Word) -> &[DefaultAtom] {
    self.offsets.get(&offset).map(|names| names.as_slice()).unwrap_or(&[])
  }

  /// Defines `name` at `offset`. On a duplicate, returns the line of the first definition.
  pub fn insert(&mut self, name: &str, offset: Word, line: usize) -> Result<(), usize> {
    let atom = DefaultAtom::from(name);
    if let Some((_, first_line)) = self.table.get(&atom) {
      return Err(*first_line);
    }
    self.offsets.entry(offset).or_default().push(atom.clone());
    self.table.insert(atom, (offset, line));
    Ok(())
  }

  /// Up to `limit` label names in offset order, for diagnostics.
  pub fn known_labels(&self, limit: usize) -> Vec<String> {
    self.offsets
        .values()
        .flatten()
        .take(limit)
        .map(|atom| atom.to_string())
        .collect()
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_duplicates_with_first_line() {
    let mut table = SymbolTable::new();
    assert_eq!(table.insert("loop", 4, 2), Ok(()));
    assert_eq!(table.insert("loop", 9, 7), Err(2));
    assert_eq!(table.get_offset("loop"), Some(4));
    assert_eq!(table.get_offset("Loop"), None);
  }

  #[test]
  fn several_labels_may_share_an_offset() {
    let mut table = SymbolTable::new();
    table.insert("start", 0, 1).unwrap();
    table.insert("main", 0, 2).unwrap();
    table.insert("end", 5, 9).unwrap();
    let names: Vec<&str> = table.get_labels(0).iter().map(|atom| &**atom).collect();
    assert_eq!(names, vec!["start", "main"]);
    assert_eq!(table.known_labels(2), vec!["start".to_string(), "main".to_string()]);
    assert_eq!(table.len(), 3);
  }
}
