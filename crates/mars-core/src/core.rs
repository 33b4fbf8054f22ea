//! The circular instruction memory.
//!
//! All addresses handed out by this module are folded into
//! `[0, core_size)`; all stored fields are folded into the signed residue
//! range `(-core_size/2, core_size/2]`. Loads and stores are routed through
//! the tracer and checked against the read/write windows.

use crate::config::SimConfig;
use crate::instruction::{Instruction, Pid};
use crate::tracer::Tracer;

/// Which window a limit check applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitKind {
    /// Read window (`read_limit`).
    Read,
    /// Write window (`write_limit`).
    Write,
}

/// Circular memory of [`Instruction`] cells with owner tags.
#[derive(Debug, Clone)]
pub struct MemoryCore {
    cells: Vec<Instruction>,
    size: u32,
    read_limit: u32,
    write_limit: u32,
}

impl MemoryCore {
    /// Allocates a core of `config.core_size` cells, each `DAT.F #0, #0`
    /// and unowned.
    #[must_use]
    pub fn new(config: &SimConfig) -> Self {
        Self {
            cells: vec![Instruction::initial(); config.core_size as usize],
            size: config.core_size,
            read_limit: config.read_limit,
            write_limit: config.write_limit,
        }
    }

    /// Number of cells.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Folds any integer into a core address in `[0, core_size)`.
    #[must_use]
    pub fn fold(&self, value: i64) -> u32 {
        let folded = value.rem_euclid(i64::from(self.size));
        u32::try_from(folded).expect("euclidean residue is non-negative and below core size")
    }

    /// Folds any integer into the signed field residue range
    /// `(-core_size/2, core_size/2]`.
    #[must_use]
    pub fn fold_field(&self, value: i64) -> i32 {
        let size = i64::from(self.size);
        let folded = value.rem_euclid(size);
        let signed = if folded > size / 2 { folded - size } else { folded };
        i32::try_from(signed).expect("signed residue fits the field width")
    }

    /// Borrows the cell at a folded address.
    #[must_use]
    pub fn cell(&self, address: u32) -> &Instruction {
        &self.cells[address as usize]
    }

    /// Returns true when `target` is inside the window of the given kind
    /// around `pc`.
    ///
    /// A target is in-window when its forward or backward distance from the
    /// PC is at most half the limit.
    #[must_use]
    pub fn check_limit(&self, kind: LimitKind, pc: u32, target: u32) -> bool {
        let limit = match kind {
            LimitKind::Read => self.read_limit,
            LimitKind::Write => self.write_limit,
        };
        let forward = self.fold(i64::from(target) - i64::from(pc));
        let backward = self.fold(i64::from(pc) - i64::from(target));
        forward <= limit / 2 || backward <= limit / 2
    }

    /// Reads the cell at `target`, window-checked from `pc`.
    ///
    /// Returns a deep copy. A read outside the read window is suppressed:
    /// it observes the initial core fill and is not traced.
    #[must_use]
    pub fn load(&self, pc: u32, target: u32, tracer: &mut dyn Tracer) -> Instruction {
        if !self.check_limit(LimitKind::Read, pc, target) {
            return Instruction::initial();
        }
        let copy = self.cells[target as usize];
        tracer.log_load(target, &copy);
        copy
    }

    /// Writes `instruction` at `target`, window-checked from `pc`.
    ///
    /// Fields are folded to signed residues and the cell is tagged with the
    /// writer's PID. Returns false when the write fell outside the write
    /// window and was dropped.
    pub fn store(
        &mut self,
        pc: u32,
        target: u32,
        instruction: Instruction,
        pid: Pid,
        tracer: &mut dyn Tracer,
    ) -> bool {
        if !self.check_limit(LimitKind::Write, pc, target) {
            return false;
        }
        let stored = Instruction {
            pid,
            a_field: self.fold_field(i64::from(instruction.a_field)),
            b_field: self.fold_field(i64::from(instruction.b_field)),
            ..instruction
        };
        self.cells[target as usize] = stored;
        tracer.log_store(target, &stored);
        true
    }

    /// Writes a cell directly, bypassing windows and tracing.
    ///
    /// Used when placing warriors before a round starts; fields are still
    /// folded to signed residues.
    pub fn write_cell(&mut self, address: u32, instruction: Instruction) {
        self.cells[address as usize] = Instruction {
            a_field: self.fold_field(i64::from(instruction.a_field)),
            b_field: self.fold_field(i64::from(instruction.b_field)),
            ..instruction
        };
    }
}
