//! Redcode '94 instruction model: opcodes, modifiers, addressing modes, and
//! the cell value type stored in the core.

use std::fmt;

/// Owner tag carried by every core cell.
///
/// `Pid::UNOWNED` marks the initial core fill and never equals the PID of a
/// loaded warrior (warrior PIDs are assigned starting at 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Pid(pub u32);

impl Pid {
    /// The unowned tag used for the initial core fill.
    pub const UNOWNED: Self = Self(0);

    /// Returns true when this tag is the unowned sentinel.
    #[must_use]
    pub const fn is_unowned(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Redcode '94 opcode set.
///
/// `CMP` is accepted as a source-level alias of `SEQ` and does not exist as
/// a distinct runtime opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Opcode {
    /// Data cell; executing it kills the process.
    Dat,
    /// Copy fields or whole instructions.
    Mov,
    /// Addition into the B-target.
    Add,
    /// Subtraction into the B-target.
    Sub,
    /// Multiplication into the B-target.
    Mul,
    /// Division into the B-target; division by zero kills the process.
    Div,
    /// Modulo into the B-target; modulo by zero kills the process.
    Mod,
    /// Unconditional jump.
    Jmp,
    /// Jump if the B-target field(s) are zero.
    Jmz,
    /// Jump if the B-target field(s) are nonzero.
    Jmn,
    /// Decrement the B-target field(s), then jump if nonzero.
    Djn,
    /// Skip the next instruction if A equals B.
    Seq,
    /// Skip the next instruction if A differs from B.
    Sne,
    /// Skip the next instruction if A is less than B.
    Slt,
    /// Fork: queue both the successor and the jump target.
    Spl,
    /// No operation.
    Nop,
}

/// Mnemonic lookup table, including the `CMP` legacy alias for `SEQ`.
pub const MNEMONIC_TABLE: &[(&str, Opcode)] = &[
    ("DAT", Opcode::Dat),
    ("MOV", Opcode::Mov),
    ("ADD", Opcode::Add),
    ("SUB", Opcode::Sub),
    ("MUL", Opcode::Mul),
    ("DIV", Opcode::Div),
    ("MOD", Opcode::Mod),
    ("JMP", Opcode::Jmp),
    ("JMZ", Opcode::Jmz),
    ("JMN", Opcode::Jmn),
    ("DJN", Opcode::Djn),
    ("CMP", Opcode::Seq),
    ("SEQ", Opcode::Seq),
    ("SNE", Opcode::Sne),
    ("SLT", Opcode::Slt),
    ("SPL", Opcode::Spl),
    ("NOP", Opcode::Nop),
];

impl Opcode {
    /// Canonical mnemonic used for display and pretty-printing.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Dat => "DAT",
            Self::Mov => "MOV",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Div => "DIV",
            Self::Mod => "MOD",
            Self::Jmp => "JMP",
            Self::Jmz => "JMZ",
            Self::Jmn => "JMN",
            Self::Djn => "DJN",
            Self::Seq => "SEQ",
            Self::Sne => "SNE",
            Self::Slt => "SLT",
            Self::Spl => "SPL",
            Self::Nop => "NOP",
        }
    }

    /// Resolves a case-insensitive mnemonic, accepting the `CMP` alias.
    #[must_use]
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        MNEMONIC_TABLE
            .iter()
            .find(|(mnemonic, _)| *mnemonic == upper)
            .map(|(_, opcode)| *opcode)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Instruction modifier selecting which operand subfields an opcode reads
/// and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Modifier {
    /// A-number to A-number.
    A,
    /// B-number to B-number.
    B,
    /// A-number to B-number.
    AB,
    /// B-number to A-number.
    BA,
    /// Both numbers, pairwise.
    F,
    /// Both numbers, crosswise.
    X,
    /// Whole instruction.
    I,
}

impl Modifier {
    /// Canonical suffix text (without the leading dot).
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::AB => "AB",
            Self::BA => "BA",
            Self::F => "F",
            Self::X => "X",
            Self::I => "I",
        }
    }

    /// Resolves a case-insensitive modifier suffix.
    ///
    /// Exactly the seven literal forms are accepted; anything else is a
    /// `BadModifier` at parse time.
    #[must_use]
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "AB" => Some(Self::AB),
            "BA" => Some(Self::BA),
            "F" => Some(Self::F),
            "X" => Some(Self::X),
            "I" => Some(Self::I),
            _ => None,
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// The eight '94 addressing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AddressMode {
    /// `#` — the operand value itself; the target is the executing cell.
    Immediate,
    /// `$` — PC-relative offset.
    Direct,
    /// `@` — indirect through the pointer cell's B-number.
    BIndirect,
    /// `<` — decrement the pointer cell's B-number, then indirect through it.
    BPredecrement,
    /// `>` — indirect through the pointer cell's B-number, then increment it.
    BPostincrement,
    /// `*` — indirect through the pointer cell's A-number.
    AIndirect,
    /// `{` — decrement the pointer cell's A-number, then indirect through it.
    APredecrement,
    /// `}` — indirect through the pointer cell's A-number, then increment it.
    APostincrement,
}

impl AddressMode {
    /// The sigil character written in source for this mode.
    #[must_use]
    pub const fn sigil(self) -> char {
        match self {
            Self::Immediate => '#',
            Self::Direct => '$',
            Self::BIndirect => '@',
            Self::BPredecrement => '<',
            Self::BPostincrement => '>',
            Self::AIndirect => '*',
            Self::APredecrement => '{',
            Self::APostincrement => '}',
        }
    }

    /// Resolves a mode sigil character.
    #[must_use]
    pub const fn from_sigil(sigil: char) -> Option<Self> {
        match sigil {
            '#' => Some(Self::Immediate),
            '$' => Some(Self::Direct),
            '@' => Some(Self::BIndirect),
            '<' => Some(Self::BPredecrement),
            '>' => Some(Self::BPostincrement),
            '*' => Some(Self::AIndirect),
            '{' => Some(Self::APredecrement),
            '}' => Some(Self::APostincrement),
            _ => None,
        }
    }

    /// Returns true for `#`.
    #[must_use]
    pub const fn is_immediate(self) -> bool {
        matches!(self, Self::Immediate)
    }
}

impl fmt::Display for AddressMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sigil())
    }
}

/// One core cell: an owned, fully-resolved Redcode instruction.
///
/// Fields hold signed residues modulo the core size. Copies are cheap and
/// explicit; the executor snapshots operand targets by copying cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Instruction {
    /// Owner of the most recent write to this cell.
    pub pid: Pid,
    /// Operation.
    pub opcode: Opcode,
    /// Subfield selector.
    pub modifier: Modifier,
    /// A-operand addressing mode.
    pub a_mode: AddressMode,
    /// A-operand field value.
    pub a_field: i32,
    /// B-operand addressing mode.
    pub b_mode: AddressMode,
    /// B-operand field value.
    pub b_field: i32,
}

impl Instruction {
    /// The initial core fill: `DAT.F #0, #0`, unowned.
    #[must_use]
    pub const fn initial() -> Self {
        Self {
            pid: Pid::UNOWNED,
            opcode: Opcode::Dat,
            modifier: Modifier::F,
            a_mode: AddressMode::Immediate,
            a_field: 0,
            b_mode: AddressMode::Immediate,
            b_field: 0,
        }
    }

    /// Compares everything except the owner tag.
    ///
    /// `SEQ.I`/`SNE.I` compare instruction images; ownership is invisible
    /// to warriors.
    #[must_use]
    pub fn same_image(&self, other: &Self) -> bool {
        self.opcode == other.opcode
            && self.modifier == other.modifier
            && self.a_mode == other.a_mode
            && self.a_field == other.a_field
            && self.b_mode == other.b_mode
            && self.b_field == other.b_field
    }
}

impl Default for Instruction {
    fn default() -> Self {
        Self::initial()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} {}{}, {}{}",
            self.opcode, self.modifier, self.a_mode, self.a_field, self.b_mode, self.b_field
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{AddressMode, Instruction, Modifier, Opcode, Pid};

    #[test]
    fn mnemonic_lookup_is_case_insensitive() {
        assert_eq!(Opcode::from_mnemonic("mov"), Some(Opcode::Mov));
        assert_eq!(Opcode::from_mnemonic("MoV"), Some(Opcode::Mov));
        assert_eq!(Opcode::from_mnemonic("SPL"), Some(Opcode::Spl));
        assert_eq!(Opcode::from_mnemonic("XYZ"), None);
    }

    #[test]
    fn cmp_is_an_alias_of_seq() {
        assert_eq!(Opcode::from_mnemonic("cmp"), Some(Opcode::Seq));
        assert_eq!(Opcode::Seq.mnemonic(), "SEQ");
    }

    #[test]
    fn modifier_suffixes_roundtrip() {
        for modifier in [
            Modifier::A,
            Modifier::B,
            Modifier::AB,
            Modifier::BA,
            Modifier::F,
            Modifier::X,
            Modifier::I,
        ] {
            assert_eq!(Modifier::from_suffix(modifier.suffix()), Some(modifier));
        }
        assert_eq!(Modifier::from_suffix("FX"), None);
        assert_eq!(Modifier::from_suffix(""), None);
    }

    #[test]
    fn mode_sigils_roundtrip() {
        for sigil in ['#', '$', '@', '<', '>', '*', '{', '}'] {
            let mode = AddressMode::from_sigil(sigil).expect("known sigil");
            assert_eq!(mode.sigil(), sigil);
        }
        assert_eq!(AddressMode::from_sigil('!'), None);
    }

    #[test]
    fn initial_fill_is_unowned_dat() {
        let cell = Instruction::initial();
        assert_eq!(cell.pid, Pid::UNOWNED);
        assert!(cell.pid.is_unowned());
        assert_eq!(cell.opcode, Opcode::Dat);
        assert_eq!(cell.modifier, Modifier::F);
        assert_eq!(cell.a_field, 0);
        assert_eq!(cell.b_field, 0);
    }

    #[test]
    fn same_image_ignores_ownership() {
        let a = Instruction {
            pid: Pid(1),
            ..Instruction::initial()
        };
        let b = Instruction {
            pid: Pid(2),
            ..Instruction::initial()
        };
        assert!(a.same_image(&b));
        assert_ne!(a, b);

        let c = Instruction {
            a_field: 7,
            ..Instruction::initial()
        };
        assert!(!a.same_image(&c));
    }

    #[test]
    fn display_is_canonical_source_form() {
        let imp = Instruction {
            pid: Pid(1),
            opcode: Opcode::Mov,
            modifier: Modifier::I,
            a_mode: AddressMode::Direct,
            a_field: 0,
            b_mode: AddressMode::Direct,
            b_field: 1,
        };
        assert_eq!(imp.to_string(), "MOV.I $0, $1");

        let bomb = Instruction::initial();
        assert_eq!(bomb.to_string(), "DAT.F #0, #0");
    }
}
