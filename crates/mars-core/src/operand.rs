//! Runtime operand resolution.
//!
//! Resolving an operand yields a relative pointer, the folded target
//! address, and a snapshot of the target cell. Pre-decrement modes mutate
//! the pointer cell before the snapshot is taken; post-increment modes
//! record the pending increment, which the executor applies to live core
//! after the opcode has run.

use crate::core::MemoryCore;
use crate::instruction::{AddressMode, Instruction, Pid};
use crate::tracer::Tracer;

/// Which field of the pointer cell an indirect mode goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSelector {
    /// The A-number.
    A,
    /// The B-number.
    B,
}

#[derive(Debug, Clone, Copy)]
struct PendingIncrement {
    address: u32,
    field: FieldSelector,
}

/// A fully resolved operand.
#[derive(Debug, Clone)]
pub struct ResolvedOperand {
    /// Pointer relative to the executing instruction.
    pub pointer: i32,
    /// Folded absolute address of the target cell.
    pub address: u32,
    /// Snapshot of the target, taken after pre-decrement and before
    /// post-increment. For immediate operands this is the executing
    /// instruction itself.
    pub target: Instruction,
    post_increment: Option<PendingIncrement>,
}

/// Mode dispatch table: (indirection field, pre-decrement, post-increment).
const fn mode_effects(mode: AddressMode) -> (Option<FieldSelector>, bool, bool) {
    match mode {
        AddressMode::Immediate | AddressMode::Direct => (None, false, false),
        AddressMode::BIndirect => (Some(FieldSelector::B), false, false),
        AddressMode::BPredecrement => (Some(FieldSelector::B), true, false),
        AddressMode::BPostincrement => (Some(FieldSelector::B), false, true),
        AddressMode::AIndirect => (Some(FieldSelector::A), false, false),
        AddressMode::APredecrement => (Some(FieldSelector::A), true, false),
        AddressMode::APostincrement => (Some(FieldSelector::A), false, true),
    }
}

const fn field_of(cell: &Instruction, field: FieldSelector) -> i32 {
    match field {
        FieldSelector::A => cell.a_field,
        FieldSelector::B => cell.b_field,
    }
}

fn set_field(cell: &mut Instruction, field: FieldSelector, value: i32) {
    match field {
        FieldSelector::A => cell.a_field = value,
        FieldSelector::B => cell.b_field = value,
    }
}

/// Resolves one operand of the instruction executing at `pc`.
///
/// Pre-decrement writes are applied here (window-checked and PID-tagged);
/// post-increments are only recorded and must be applied with
/// [`apply_post_increment`] after the opcode has run.
pub fn resolve(
    core: &mut MemoryCore,
    pc: u32,
    mode: AddressMode,
    field: i32,
    pid: Pid,
    tracer: &mut dyn Tracer,
) -> ResolvedOperand {
    if mode.is_immediate() {
        let target = *core.cell(pc);
        tracer.log_operand(0, &target, None);
        return ResolvedOperand {
            pointer: 0,
            address: pc,
            target,
            post_increment: None,
        };
    }

    let (indirect, pre_decrement, post_increment) = mode_effects(mode);

    let Some(selector) = indirect else {
        // Direct: the field is the pointer.
        let address = core.fold(i64::from(pc) + i64::from(field));
        let target = core.load(pc, address, tracer);
        tracer.log_operand(field, &target, None);
        return ResolvedOperand {
            pointer: field,
            address,
            target,
            post_increment: None,
        };
    };

    let pointer_address = core.fold(i64::from(pc) + i64::from(field));
    let mut pointer_cell = core.load(pc, pointer_address, tracer);

    if pre_decrement {
        let decremented = core.fold_field(i64::from(field_of(&pointer_cell, selector)) - 1);
        set_field(&mut pointer_cell, selector, decremented);
        let _ = core.store(pc, pointer_address, pointer_cell, pid, tracer);
    }

    let pointer = field + field_of(&pointer_cell, selector);
    let address = core.fold(i64::from(pc) + i64::from(pointer));
    let target = core.load(pc, address, tracer);

    let pending = post_increment.then_some(PendingIncrement {
        address: pointer_address,
        field: selector,
    });
    let pending_cell = pending.map(|_| &pointer_cell);
    tracer.log_operand(pointer, &target, pending_cell);

    ResolvedOperand {
        pointer,
        address,
        target,
        post_increment: pending,
    }
}

/// Applies a recorded post-increment to live core.
///
/// The increment targets whatever the pointer cell holds now, so an opcode
/// that overwrote it sees its own result incremented.
pub fn apply_post_increment(
    core: &mut MemoryCore,
    operand: &ResolvedOperand,
    pc: u32,
    pid: Pid,
    tracer: &mut dyn Tracer,
) {
    let Some(pending) = operand.post_increment else {
        return;
    };
    let mut cell = *core.cell(pending.address);
    let incremented = core.fold_field(i64::from(field_of(&cell, pending.field)) + 1);
    set_field(&mut cell, pending.field, incremented);
    let _ = core.store(pc, pending.address, cell, pid, tracer);
}
