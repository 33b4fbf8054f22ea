//! Assembled, position-independent warriors.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::instruction::Instruction;

/// Warrior metadata collected from `;name`, `;author`, and `;strategy`
/// comments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Metadata {
    /// Warrior name.
    pub name: Option<String>,
    /// Author name.
    pub author: Option<String>,
    /// Strategy lines, in source order.
    pub strategies: Vec<String>,
}

/// An assembled warrior, independent of any load address.
///
/// Instruction fields are fully resolved integers; the owner tags are
/// [`crate::instruction::Pid::UNOWNED`] placeholders until the scheduler
/// loads the program into a core.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Program {
    /// Instructions in program order.
    pub instructions: Vec<Instruction>,
    /// Entry offset from `ORG`/`END <expr>` (0 when absent).
    pub start: usize,
    /// Label definitions mapping names to instruction offsets.
    pub labels: HashMap<String, usize>,
    /// Name, author, and strategy metadata.
    pub metadata: Metadata,
}

impl Program {
    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true when the program has no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Renders canonical Redcode source.
    ///
    /// The output carries the metadata comments, an explicit numeric `ORG`,
    /// every instruction with explicit modifier and modes, and a closing
    /// `END`. Re-assembling it reproduces the same instructions, start
    /// offset, and metadata (labels are already folded into the fields and
    /// are not emitted).
    #[must_use]
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        if let Some(name) = &self.metadata.name {
            let _ = writeln!(out, ";name {name}");
        }
        if let Some(author) = &self.metadata.author {
            let _ = writeln!(out, ";author {author}");
        }
        for strategy in &self.metadata.strategies {
            let _ = writeln!(out, ";strategy {strategy}");
        }
        let _ = writeln!(out, "ORG {}", self.start);
        for instruction in &self.instructions {
            let _ = writeln!(out, "    {instruction}");
        }
        out.push_str("END\n");
        out
    }
}
