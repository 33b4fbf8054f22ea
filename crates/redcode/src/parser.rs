//! Redcode line parser.
//!
//! Converts one source line (after constant substitution) into a structured
//! [`ParsedLine`]: an instruction with resolved modifier and operand
//! expressions, a pseudo-op, a label, or a blank. Inline comments are
//! stripped here; full-line metadata comments are handled by the assembler
//! before this parser runs.

use mars_core::{AddressMode, Modifier, Opcode};

use crate::errors::{AssemblyErrorKind, ParseError};
use crate::expr::Expr;

/// An instruction as written in source: expressions not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInstruction {
    /// Operation.
    pub opcode: Opcode,
    /// Explicit or defaulted modifier.
    pub modifier: Modifier,
    /// A-operand mode (`$` when omitted).
    pub a_mode: AddressMode,
    /// A-operand expression.
    pub a_expr: Expr,
    /// B-operand mode (`$` when omitted, `#` when the operand is absent).
    pub b_mode: AddressMode,
    /// B-operand expression (`0` when the operand is absent).
    pub b_expr: Expr,
}

/// One structurally parsed source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// Empty or comment-only line.
    Blank,
    /// A label with no statement on the same line.
    Label {
        /// Label name (case-sensitive).
        name: String,
    },
    /// `name EQU rhs` constant definition; the right side stays textual.
    Equ {
        /// Constant name.
        name: String,
        /// Raw substitution text.
        rhs: String,
    },
    /// `ORG expr` start-offset directive.
    Org {
        /// Start-offset expression.
        expr: Expr,
    },
    /// `END [expr]`; stops scanning, optionally setting the start offset.
    End {
        /// Optional start-offset expression.
        expr: Option<Expr>,
    },
    /// `[var] FOR expr` loop header.
    For {
        /// Loop variable (the label), if named.
        var: Option<String>,
        /// Iteration-count expression.
        count: Expr,
    },
    /// `ROF` loop terminator.
    Rof,
    /// An instruction, optionally labeled.
    Instruction {
        /// Leading label, if present.
        label: Option<String>,
        /// The parsed instruction.
        instruction: SourceInstruction,
    },
}

/// Applies the '94 default-modifier table for an opcode and operand modes.
#[must_use]
pub fn default_modifier(opcode: Opcode, a_mode: AddressMode, b_mode: AddressMode) -> Modifier {
    let a_immediate = a_mode.is_immediate();
    let b_immediate = b_mode.is_immediate();
    match opcode {
        Opcode::Dat | Opcode::Nop => Modifier::F,
        Opcode::Mov | Opcode::Seq | Opcode::Sne => {
            if a_immediate {
                Modifier::AB
            } else if b_immediate {
                Modifier::B
            } else {
                Modifier::I
            }
        }
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => {
            if a_immediate {
                Modifier::AB
            } else if b_immediate {
                Modifier::B
            } else {
                Modifier::F
            }
        }
        Opcode::Slt => {
            if a_immediate {
                Modifier::AB
            } else {
                Modifier::B
            }
        }
        Opcode::Jmp | Opcode::Jmz | Opcode::Jmn | Opcode::Djn | Opcode::Spl => Modifier::B,
    }
}

/// Parses one source line.
///
/// # Errors
///
/// Returns a [`ParseError`] carrying the line number and the column of the
/// offending token.
pub fn parse_line(text: &str, line_number: usize) -> Result<ParsedLine, ParseError> {
    let stripped = strip_comment(text);
    if stripped.trim().is_empty() {
        return Ok(ParsedLine::Blank);
    }

    let (first_start, first) = next_word(stripped, 0).expect("non-blank line has a word");

    let mut label = None;
    let mut statement_start = first_start;
    let mut statement_word = first;

    if !is_statement_keyword(first) {
        let name = first.strip_suffix(':').unwrap_or(first);
        if !is_identifier(name) {
            return Err(ParseError::new(
                AssemblyErrorKind::Syntax(format!("unknown opcode or label '{first}'")),
                line_number,
                first_start + 1,
            ));
        }
        label = Some(name.to_string());

        match next_word(stripped, first_start + first.len()) {
            Some((start, word)) => {
                statement_start = start;
                statement_word = word;
            }
            None => {
                return Ok(ParsedLine::Label {
                    name: label.expect("label was just set"),
                });
            }
        }
    }

    let rest_start = statement_start + statement_word.len();
    let rest = &stripped[rest_start..];

    match statement_word.to_ascii_uppercase().as_str() {
        "EQU" => {
            let Some(name) = label else {
                return Err(ParseError::new(
                    AssemblyErrorKind::Syntax("EQU requires a name".into()),
                    line_number,
                    statement_start + 1,
                ));
            };
            Ok(ParsedLine::Equ {
                name,
                rhs: rest.trim().to_string(),
            })
        }
        "ORG" => {
            let expr = parse_expression(rest, rest_start, line_number)?;
            Ok(ParsedLine::Org { expr })
        }
        "END" => {
            let expr = if rest.trim().is_empty() {
                None
            } else {
                Some(parse_expression(rest, rest_start, line_number)?)
            };
            Ok(ParsedLine::End { expr })
        }
        "FOR" => {
            let count = parse_expression(rest, rest_start, line_number)?;
            Ok(ParsedLine::For { var: label, count })
        }
        "ROF" => Ok(ParsedLine::Rof),
        _ => {
            let instruction =
                parse_instruction(statement_word, statement_start, rest, rest_start, line_number)?;
            Ok(ParsedLine::Instruction { label, instruction })
        }
    }
}

fn parse_instruction(
    opcode_word: &str,
    opcode_start: usize,
    operands: &str,
    operands_start: usize,
    line_number: usize,
) -> Result<SourceInstruction, ParseError> {
    let (mnemonic, suffix) = match opcode_word.split_once('.') {
        Some((mnemonic, suffix)) => (mnemonic, Some(suffix)),
        None => (opcode_word, None),
    };

    let Some(opcode) = Opcode::from_mnemonic(mnemonic) else {
        return Err(ParseError::new(
            AssemblyErrorKind::Syntax(format!("unknown opcode '{mnemonic}'")),
            line_number,
            opcode_start + 1,
        ));
    };

    let modifier = suffix
        .map(|text| {
            Modifier::from_suffix(text).ok_or_else(|| {
                ParseError::new(
                    AssemblyErrorKind::BadModifier(text.to_string()),
                    line_number,
                    opcode_start + mnemonic.len() + 2,
                )
            })
        })
        .transpose()?;

    let mut parts = operands.splitn(3, ',');
    let a_part = parts.next().unwrap_or("");
    let b_part = parts.next();
    if parts.next().is_some() {
        return Err(ParseError::new(
            AssemblyErrorKind::Syntax("too many operands".into()),
            line_number,
            operands_start + 1,
        ));
    }

    if a_part.trim().is_empty() {
        return Err(ParseError::new(
            AssemblyErrorKind::MissingOperand,
            line_number,
            opcode_start + 1,
        ));
    }

    let (a_mode, a_expr) = parse_operand(a_part, operands_start, line_number)?;
    let (b_mode, b_expr) = match b_part {
        Some(part) => {
            let offset = operands_start + a_part.len() + 1;
            parse_operand(part, offset, line_number)?
        }
        // A missing B-operand defaults to `#0`.
        None => (AddressMode::Immediate, Expr::Number(0)),
    };

    let modifier = modifier.unwrap_or_else(|| default_modifier(opcode, a_mode, b_mode));

    Ok(SourceInstruction {
        opcode,
        modifier,
        a_mode,
        a_expr,
        b_mode,
        b_expr,
    })
}

fn parse_operand(
    part: &str,
    part_start: usize,
    line_number: usize,
) -> Result<(AddressMode, Expr), ParseError> {
    let leading = part.len() - part.trim_start().len();
    let trimmed = part.trim();
    let start = part_start + leading;

    let first = trimmed.chars().next().expect("operand checked non-empty");
    let (mode, expr_text, expr_start) = match AddressMode::from_sigil(first) {
        Some(mode) => (mode, &trimmed[first.len_utf8()..], start + first.len_utf8()),
        None => (AddressMode::Direct, trimmed, start),
    };

    let expr = Expr::parse(expr_text).map_err(|error| {
        ParseError::new(
            AssemblyErrorKind::Syntax(error.message),
            line_number,
            expr_start + error.offset + 1,
        )
    })?;
    Ok((mode, expr))
}

fn parse_expression(text: &str, text_start: usize, line_number: usize) -> Result<Expr, ParseError> {
    let leading = text.len() - text.trim_start().len();
    Expr::parse(text.trim()).map_err(|error| {
        ParseError::new(
            AssemblyErrorKind::Syntax(error.message),
            line_number,
            text_start + leading + error.offset + 1,
        )
    })
}

fn strip_comment(line: &str) -> &str {
    line.find(';').map_or(line, |pos| &line[..pos])
}

fn next_word(text: &str, from: usize) -> Option<(usize, &str)> {
    let bytes = text.as_bytes();
    let mut i = from;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() {
        return None;
    }
    let start = i;
    while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    Some((start, &text[start..i]))
}

/// Returns true when the word begins a statement: a pseudo-op or an opcode
/// mnemonic (with optional modifier suffix).
pub(crate) fn is_statement_keyword(word: &str) -> bool {
    let upper = word.to_ascii_uppercase();
    if matches!(upper.as_str(), "EQU" | "ORG" | "END" | "FOR" | "ROF") {
        return true;
    }
    let mnemonic = word.split_once('.').map_or(word, |(mnemonic, _)| mnemonic);
    Opcode::from_mnemonic(mnemonic).is_some()
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_alphabetic() && first != '_' {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
