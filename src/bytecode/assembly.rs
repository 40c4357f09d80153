/*!
  The human readable textual form of bytecode is called assembly. This module splits a line of
  assembly into its labels, mnemonic and operand tokens, and classifies each operand token. It
  knows nothing about what an operation expects; that is the assembler's business.

  A line looks like

    label: another_label: MNEMONIC op1, op2 op3   ; comment

  where every part is optional. Operands are separated by commas and/or whitespace.
*/

use nom::{
  branch::alt,
  bytes::complete::{is_not, tag, tag_no_case, take_till, take_while},
  character::complete::{alpha1, alphanumeric1, char as one_char, digit1, hex_digit1, space0},
  combinator::{all_consuming, map, map_res, opt, recognize},
  multi::{many0, many0_count},
  sequence::{pair, preceded, terminated},
  IResult
};

use crate::bytecode::{Register, REGISTER_COUNT};
use crate::error::AssembleErrorKind;

/// Directive emitting one raw data word.
pub const WORD_DIRECTIVE: &str = ".word";

/// A classified operand token. Labels are resolved later, once every label is known.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Operand<'a> {
  Register(Register),
  Immediate(i64),
  /// Either `$name` or a bare `name`.
  Label(&'a str),
}

/// An operand together with the text it was parsed from, for error messages.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Argument<'a> {
  pub text    : &'a str,
  pub operand : Operand<'a>
}

/// A mnemonic or directive with its operand tokens, not yet classified.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Statement<'a> {
  pub mnemonic : &'a str,
  pub operands : Vec<&'a str>
}

impl<'a> Statement<'a> {
  pub fn is_word_directive(&self) -> bool {
    self.mnemonic.eq_ignore_ascii_case(WORD_DIRECTIVE)
  }

  /// Classifies the operand tokens in order, failing on the first malformed one.
  pub fn arguments(&self) -> Result<Vec<Argument<'a>>, AssembleErrorKind> {
    self.operands
        .iter()
        .map(|&text| parse_operand(text).map(|operand| Argument{ text, operand }))
        .collect()
  }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ParsedLine<'a> {
  pub labels    : Vec<&'a str>,
  /// `None` for lines holding only labels, comments or whitespace.
  pub statement : Option<Statement<'a>>
}

fn is_separator(c: char) -> bool {
  c == ' ' || c == '\t' || c == ','
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn identifier(text: &str) -> IResult<&str, &str> {
  recognize(
    pair(
      alt((alpha1, tag("_"))),
      many0_count(alt((alphanumeric1, tag("_"))))
    )
  )(text)
}

pub fn is_identifier(text: &str) -> bool {
  all_consuming(identifier)(text).is_ok()
}

/// A run of non-separator characters.
fn token(text: &str) -> IResult<&str, &str> {
  is_not(" \t,")(text)
}

/// One label definition: a token ending in `:`. Yields the text before the colon, valid or not.
fn label_definition(text: &str) -> IResult<&str, &str> {
  preceded(space0, terminated(is_not(" \t,:"), one_char(':')))(text)
}

fn unsigned_number(text: &str) -> IResult<&str, i64> {
  alt((
    map_res(preceded(tag_no_case("0x"), hex_digit1), |digits: &str| i64::from_str_radix(digits, 16)),
    map_res(digit1, |digits: &str| digits.parse::<i64>())
  ))(text)
}

/// An optionally signed decimal or `0x` hexadecimal number.
fn number(text: &str) -> IResult<&str, i64> {
  map(
    pair(opt(alt((one_char('-'), one_char('+')))), unsigned_number),
    |(sign, value)| if sign == Some('-') { -value } else { value }
  )(text)
}

pub fn parse_number(text: &str) -> Option<i64> {
  all_consuming(number)(text).ok().map(|(_, value)| value)
}

/// `R` or `r` followed only by decimal digits. The digits are neither parsed nor range checked.
fn register_token(text: &str) -> IResult<&str, &str> {
  preceded(alt((one_char('R'), one_char('r'))), digit1)(text)
}

/**
  Classifies one operand token: `R7`, `#-12`, `#0x1F`, `$label` or a bare `label`. Register
  indices are checked here; immediate ranges depend on the field and are checked by the assembler.
*/
pub fn parse_operand(text: &str) -> Result<Operand<'_>, AssembleErrorKind> {
  if let Some(rest) = text.strip_prefix('#') {
    return parse_number(rest)
        .map(Operand::Immediate)
        .ok_or(AssembleErrorKind::InvalidImmediate {
          token    : text.to_string(),
          expected : "a decimal or 0x hexadecimal number after `#`"
        });
  }

  if let Some(rest) = text.strip_prefix('$') {
    return match is_identifier(rest) {
      true  => Ok(Operand::Label(rest)),
      false => Err(AssembleErrorKind::InvalidImmediate {
        token    : text.to_string(),
        expected : "a label name after `$`"
      })
    };
  }

  if let Ok((_, digits)) = all_consuming(register_token)(text) {
    return match digits.parse::<usize>() {
      Ok(index) if index < REGISTER_COUNT => Ok(Operand::Register(index as Register)),
      _                                   => Err(AssembleErrorKind::InvalidRegister{ token: text.to_string() })
    };
  }

  match is_identifier(text) {
    true  => Ok(Operand::Label(text)),
    false => Err(AssembleErrorKind::InvalidImmediate {
      token    : text.to_string(),
      expected : "a register, #immediate or $label"
    })
  }
}

/// Drops a trailing `;` comment.
fn strip_comment(line: &str) -> &str {
  let parsed: IResult<&str, &str> = take_till(|c| c == ';')(line);
  match parsed {
    Ok((_, code)) => code,
    Err(_)        => line
  }
}

fn statement(text: &str) -> IResult<&str, (&str, Vec<&str>)> {
  pair(
    preceded(space0, token),
    many0(preceded(take_while(is_separator), token))
  )(text)
}

/// Splits one source line. Fails on a malformed label or a missing mnemonic; operands are classified later.
pub fn parse_line(line: &str) -> Result<ParsedLine<'_>, AssembleErrorKind> {
  let mut rest   = strip_comment(line).trim();
  let mut labels = Vec::new();

  while let Ok((remaining, label)) = label_definition(rest) {
    if !is_identifier(label) {
      return Err(AssembleErrorKind::MalformedLabel(label.to_string()));
    }
    labels.push(label);
    rest = remaining.trim_start();
  }

  if rest.is_empty() {
    return Ok(ParsedLine{ labels, statement: None });
  }

  // Fails only when `rest` starts with a comma.
  let (mnemonic, operands) =
    match statement(rest) {
      Ok((_, parts)) => parts,
      Err(_)         => return Err(AssembleErrorKind::UnknownMnemonic(rest.to_string()))
    };

  Ok(ParsedLine{ labels, statement: Some(Statement{ mnemonic, operands }) })
}
