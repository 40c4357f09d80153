/*!
  The two-pass assembler. Pass one splits every line and assigns each label the offset of the word
  it designates; pass two classifies and resolves operands against the finished label table and
  encodes one word per instruction or directive. Whichever pass fails, the error reported is the one
  on the earliest line, and no partial image is produced.
*/

use log::trace;
use prettytable::{row, Table};

use crate::bitfield::BitField;
use crate::bytecode::{
  assembly::{parse_line, Argument, Operand, Statement},
  encode_instruction,
  layout,
  lookup_by_name,
  try_decode_instruction,
  DecodeError,
  Descriptor,
  Instruction,
  Register,
  Source,
  Syntax,
  Word
};
use crate::cpu::TABLE_DISPLAY_FORMAT;
use crate::error::{AssembleError, AssembleErrorKind, KNOWN_LABEL_LIMIT};
use crate::symboltable::SymbolTable;

const IMMEDIATE_EXPECTED : &str = "a value between -32768 and 0xFFFF";
const WORD_EXPECTED      : &str = "a value between -2^31 and 0xFFFFFFFF";
const OPERAND_EXPECTED   : &str = "#imm or $label";

/// The result of assembling a source: the image and the labels that were defined in it.
#[derive(Debug, Default)]
pub struct Assembly {
  pub words   : Vec<Word>,
  pub symbols : SymbolTable
}

/// A word-producing line remembered by pass one.
struct PendingLine<'a> {
  line      : usize,
  text      : &'a str,
  statement : Statement<'a>
}

/// Assembles `source` into a word image.
pub fn assemble(source: &str) -> Result<Vec<Word>, AssembleError> {
  assemble_program(source).map(|assembly| assembly.words)
}

/// Assembles `source`, also returning its label table for listings.
pub fn assemble_program(source: &str) -> Result<Assembly, AssembleError> {
  let mut symbols = SymbolTable::new();
  let mut pending = Vec::new();

  // Label errors are held back so that pass two can still report an earlier line.
  let mut label_error: Option<AssembleError> = None;

  // Pass one
  for (index, text) in source.lines().enumerate() {
    let line   = index + 1;
    let fail   = |kind| AssembleError{ line, text: text.to_string(), kind };
    let parsed =
      match parse_line(text) {
        Ok(parsed) => parsed,
        Err(kind)  => {
          label_error.get_or_insert(fail(kind));
          continue;
        }
      };
    let offset = pending.len() as Word;

    for label in parsed.labels {
      if let Err(first_line) = symbols.insert(label, offset, line) {
        label_error.get_or_insert(fail(AssembleErrorKind::DuplicateLabel{ name: label.to_string(), first_line }));
      }
    }

    if let Some(statement) = parsed.statement {
      pending.push(PendingLine{ line, text, statement });
    }
  }

  // Pass two
  let mut words = Vec::with_capacity(pending.len());
  for (offset, pending_line) in pending.iter().enumerate() {
    if let Some(error) = label_error.as_ref().filter(|error| error.line <= pending_line.line) {
      return Err(error.clone());
    }

    let encoder = Encoder{ symbols: &symbols, offset: offset as Word };
    let word =
      encoder.encode(&pending_line.statement)
             .map_err(|kind| AssembleError {
               line : pending_line.line,
               text : pending_line.text.to_string(),
               kind
             })?;
    trace!("{:>5}  0x{:04X}  0x{:08X}  {}", pending_line.line, offset, word, pending_line.text.trim());
    words.push(word);
  }

  match label_error {
    Some(error) => Err(error),
    None        => Ok(Assembly{ words, symbols })
  }
}

/// Resolves and encodes the statement at `offset`.
struct Encoder<'s> {
  symbols : &'s SymbolTable,
  offset  : Word
}

impl<'s> Encoder<'s> {

  fn encode(&self, statement: &Statement) -> Result<Word, AssembleErrorKind> {
    if statement.is_word_directive() {
      return self.data_word(&statement.arguments()?);
    }

    let descriptor =
      lookup_by_name(statement.mnemonic)
        .ok_or_else(|| AssembleErrorKind::UnknownMnemonic(statement.mnemonic.to_string()))?;
    let instruction = self.instruction(&descriptor, &statement.arguments()?)?;
    Ok(encode_instruction(&instruction))
  }

  fn label(&self, name: &str) -> Result<Word, AssembleErrorKind> {
    self.symbols.get_offset(name).ok_or_else(|| AssembleErrorKind::UnknownLabel {
      name  : name.to_string(),
      known : self.symbols.known_labels(KNOWN_LABEL_LIMIT),
      total : self.symbols.len()
    })
  }

  /// The value of an immediate or label operand, not yet range checked.
  fn value(&self, argument: &Argument) -> Result<i64, AssembleErrorKind> {
    match argument.operand {
      Operand::Immediate(value) => Ok(value),
      Operand::Label(name)      => self.label(name).map(|offset| offset as i64),
      Operand::Register(_)      => Err(AssembleErrorKind::InvalidImmediate {
        token    : argument.text.to_string(),
        expected : OPERAND_EXPECTED
      })
    }
  }

  fn register(&self, argument: &Argument) -> Result<Register, AssembleErrorKind> {
    match argument.operand {
      Operand::Register(register) => Ok(register),
      _                           => Err(AssembleErrorKind::InvalidRegister {
        token: argument.text.to_string()
      })
    }
  }

  /// A 16 bit field. Values above 0x7FFF are taken as the raw bit pattern.
  fn immediate(&self, argument: &Argument) -> Result<i16, AssembleErrorKind> {
    let value = self.value(argument)?;
    match (i16::MIN as i64..=u16::MAX as i64).contains(&value) {
      true  => Ok(value as u16 as i16),
      false => Err(AssembleErrorKind::InvalidImmediate {
        token    : argument.text.to_string(),
        expected : IMMEDIATE_EXPECTED
      })
    }
  }

  fn source(&self, argument: &Argument) -> Result<Source, AssembleErrorKind> {
    match argument.operand {
      Operand::Register(register) => Ok(Source::Register(register)),
      _                           => self.immediate(argument).map(Source::Immediate)
    }
  }

  /// A branch displacement. Labels are measured from the word after the branch.
  fn target(&self, argument: &Argument) -> Result<i32, AssembleErrorKind> {
    let offset =
      match argument.operand {
        Operand::Label(name) => self.label(name)? as i64 - (self.offset as i64 + 1),
        _                    => self.value(argument)?
      };
    let field: BitField = layout::M_OFFSET;
    match field.fits_signed(offset) {
      true  => Ok(offset as i32),
      false => Err(AssembleErrorKind::OffsetOutOfRange {
        token : argument.text.to_string(),
        offset,
        bits  : field.width
      })
    }
  }

  /// `PUSH #mask` or `PUSH R1, R4, ...`
  fn mask(&self, arguments: &[Argument]) -> Result<i16, AssembleErrorKind> {
    match arguments {
      [single] if !matches!(single.operand, Operand::Register(_)) => self.immediate(single),

      _ => {
        let mut mask: u16 = 0;
        for argument in arguments {
          mask |= 1 << self.register(argument)?;
        }
        Ok(mask as i16)
      }
    }
  }

  fn data_word(&self, arguments: &[Argument]) -> Result<Word, AssembleErrorKind> {
    let argument =
      match arguments {
        [argument] => argument,
        _          => return Err(AssembleErrorKind::WrongOperandCount {
          mnemonic : ".word",
          usage    : OPERAND_EXPECTED,
          found    : arguments.len()
        })
      };
    let value = self.value(argument)?;
    match (i32::MIN as i64..=u32::MAX as i64).contains(&value) {
      true  => Ok(value as Word),
      false => Err(AssembleErrorKind::InvalidImmediate {
        token    : argument.text.to_string(),
        expected : WORD_EXPECTED
      })
    }
  }

  fn instruction(&self, descriptor: &Descriptor, arguments: &[Argument]) -> Result<Instruction, AssembleErrorKind> {
    let operation = descriptor.operation;
    let wrong_count = || AssembleErrorKind::WrongOperandCount {
      mnemonic : descriptor.mnemonic,
      usage    : descriptor.syntax.usage(),
      found    : arguments.len()
    };

    let instruction =
      match (descriptor.syntax, arguments) {

        (Syntax::Nullary, []) => Instruction::nullary(operation),

        (Syntax::RegReg, [rd, rs]) => {
          Instruction::Register {
            operation,
            rd : self.register(rd)?,
            rs : self.register(rs)?,
            rt : 0
          }
        }

        (Syntax::RegSource, [rd, source]) => {
          Instruction::RegisterImmediate {
            operation,
            rd     : self.register(rd)?,
            rs     : 0,
            source : self.source(source)?
          }
        }

        (Syntax::RegRegSource, [rd, source]) => {
          let rd = self.register(rd)?;
          Instruction::RegisterImmediate{ operation, rd, rs: rd, source: self.source(source)? }
        }

        (Syntax::RegRegSource, [rd, rs, source]) => {
          Instruction::RegisterImmediate {
            operation,
            rd     : self.register(rd)?,
            rs     : self.register(rs)?,
            source : self.source(source)?
          }
        }

        | (Syntax::RegImmediate, [rd, immediate])
        | (Syntax::RegAddress, [rd, immediate]) => {
          Instruction::Immediate {
            operation,
            rd        : self.register(rd)?,
            base      : None,
            immediate : self.immediate(immediate)?
          }
        }

        (Syntax::RegAddress, [rd, base, immediate]) => {
          Instruction::Immediate {
            operation,
            rd        : self.register(rd)?,
            base      : Some(self.register(base)?),
            immediate : self.immediate(immediate)?
          }
        }

        (Syntax::Mask, arguments) if !arguments.is_empty() => {
          Instruction::Immediate{ operation, rd: 0, base: None, immediate: self.mask(arguments)? }
        }

        (Syntax::Immediate, [number]) => {
          Instruction::Immediate{ operation, rd: 0, base: None, immediate: self.immediate(number)? }
        }

        (Syntax::Target, [target]) => {
          Instruction::Branch{ operation, offset: self.target(target)? }
        }

        _ => return Err(wrong_count())

      };

    Ok(instruction)
  }
}

/// Decodes one word back into an instruction.
pub fn disassemble(word: Word) -> Result<Instruction, DecodeError> {
  try_decode_instruction(word)
}

/**
  Renders an image as a table of address, word, labels and disassembly. Words that do not decode
  are shown as `.word` data. Branches are annotated with their absolute target.
*/
pub fn listing(words: &[Word], symbols: &SymbolTable) -> Table {
  let mut table = Table::new();
  table.set_format(*TABLE_DISPLAY_FORMAT);
  table.set_titles(row![ubr->"Address", ubl->"Word", ubl->"Label", ubl->"Instruction"]);

  for (offset, &word) in words.iter().enumerate() {
    let offset = offset as Word;
    let labels: Vec<String> =
      symbols.get_labels(offset)
             .iter()
             .map(|name| format!("{}:", name))
             .collect();

    let text =
      match disassemble(word) {

        Ok(instruction @ Instruction::Branch{ offset: displacement, .. }) => {
          let target = (offset as i64 + 1 + displacement as i64) as Word;
          match symbols.get_labels(target).first() {
            Some(name) => format!("{:<20} ; -> 0x{:04X} ({})", instruction.to_string(), target, name),
            None       => format!("{:<20} ; -> 0x{:04X}", instruction.to_string(), target),
          }
        }

        Ok(instruction) => instruction.to_string(),

        Err(_) => format!(".word #0x{:08X}", word),

      };

    table.add_row(row![r->format!("0x{:04X}", offset), format!("0x{:08X}", word), labels.join(" "), text]);
  }

  table
}
