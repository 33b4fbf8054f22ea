//! Structured assembly errors with source locations.
//!
//! Every error carries `(file, line, column)`; the first error aborts
//! assembly. Errors render in the standard compiler style:
//!
//! ```text
//! dwarf.red:10:5: error: unknown symbol 'bomb'
//! ```
//!
//! and optionally with a caret pointer against the offending source line.

use std::fmt;

/// Position of an error in the original source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Source file name.
    pub file: String,
    /// 1-indexed line number.
    pub line: usize,
    /// 1-indexed column number (1 if unknown).
    pub column: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Classification of assembly errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyErrorKind {
    /// Malformed line, token, or expression.
    Syntax(String),
    /// An expression referenced an undefined label.
    UnknownSymbol(String),
    /// `EQU` redefined an existing constant.
    RedefinedConstant(String),
    /// Required A-operand is missing.
    MissingOperand,
    /// Modifier suffix outside the seven literal forms.
    BadModifier(String),
    /// Division or modulo by zero while evaluating an expression.
    DivByZeroInExpr,
    /// A `FOR` was still open at the end of the source.
    ForWithoutRof,
    /// A label was defined at two different offsets.
    LabelCollision(String),
}

impl fmt::Display for AssemblyErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax(message) => write!(f, "{message}"),
            Self::UnknownSymbol(name) => write!(f, "unknown symbol '{name}'"),
            Self::RedefinedConstant(name) => write!(f, "constant '{name}' is already defined"),
            Self::MissingOperand => write!(f, "missing A-operand"),
            Self::BadModifier(text) => write!(f, "bad modifier '.{text}'"),
            Self::DivByZeroInExpr => write!(f, "division by zero in expression"),
            Self::ForWithoutRof => write!(f, "FOR without matching ROF"),
            Self::LabelCollision(name) => write!(f, "label '{name}' is already defined"),
        }
    }
}

/// A parse-phase error, located by line and column only.
///
/// The assembler pipeline attaches the file name to produce an
/// [`AssemblyError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Kind of error.
    pub kind: AssemblyErrorKind,
    /// 1-indexed source line.
    pub line: usize,
    /// 1-indexed source column (1 if unknown).
    pub column: usize,
}

impl ParseError {
    /// Creates a parse error at a line/column position.
    #[must_use]
    pub const fn new(kind: AssemblyErrorKind, line: usize, column: usize) -> Self {
        Self { kind, line, column }
    }

    /// Attaches a file name, producing a full assembly error.
    #[must_use]
    pub fn in_file(self, file: &str) -> AssemblyError {
        AssemblyError {
            kind: self.kind,
            location: SourceLocation {
                file: file.to_string(),
                line: self.line,
                column: self.column,
            },
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.kind)
    }
}

impl std::error::Error for ParseError {}

/// A located assembly error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyError {
    /// Kind of error.
    pub kind: AssemblyErrorKind,
    /// Where it happened.
    pub location: SourceLocation,
}

impl AssemblyError {
    /// Formats the error for stderr output.
    #[must_use]
    pub fn format_for_stderr(&self) -> String {
        format!("{}: error: {}", self.location, self.kind)
    }

    /// Formats the error with a caret pointer under the offending column.
    ///
    /// `source_line` is the text of the line named by the location.
    #[must_use]
    pub fn format_with_caret(&self, source_line: &str) -> String {
        let caret_indent = " ".repeat(self.location.column.saturating_sub(1));
        format!(
            "{}\n    {}\n    {caret_indent}^",
            self.format_for_stderr(),
            source_line
        )
    }
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.kind)
    }
}

impl std::error::Error for AssemblyError {}

#[cfg(test)]
mod tests {
    use super::{AssemblyErrorKind, ParseError, SourceLocation};

    #[test]
    fn stderr_format_is_compiler_style() {
        let error = ParseError::new(AssemblyErrorKind::UnknownSymbol("bomb".into()), 10, 5)
            .in_file("dwarf.red");
        assert_eq!(
            error.format_for_stderr(),
            "dwarf.red:10:5: error: unknown symbol 'bomb'"
        );
    }

    #[test]
    fn caret_points_at_the_column() {
        let error = ParseError::new(AssemblyErrorKind::MissingOperand, 2, 8).in_file("imp.red");
        let rendered = error.format_with_caret("        DAT");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "imp.red:2:8: error: missing A-operand");
        assert_eq!(lines[1], "            DAT");
        assert_eq!(lines[2], "           ^");
    }

    #[test]
    fn location_displays_file_line_column() {
        let location = SourceLocation {
            file: "a.red".into(),
            line: 3,
            column: 7,
        };
        assert_eq!(location.to_string(), "a.red:3:7");
    }

    #[test]
    fn kind_messages_name_the_subject() {
        assert_eq!(
            AssemblyErrorKind::RedefinedConstant("STEP".into()).to_string(),
            "constant 'STEP' is already defined"
        );
        assert_eq!(
            AssemblyErrorKind::BadModifier("FX".into()).to_string(),
            "bad modifier '.FX'"
        );
        assert_eq!(
            AssemblyErrorKind::ForWithoutRof.to_string(),
            "FOR without matching ROF"
        );
    }
}
