//! Per-opcode execution semantics.
//!
//! One call to [`execute`] runs the instruction at `pc` on behalf of `pid`
//! and returns the program counters to enqueue. The protocol is fixed:
//! resolve the A-operand (applying its pre-effects and snapshotting its
//! target), resolve the B-operand the same way, dispatch on the opcode,
//! apply A- then B-post-increments to live core, and finally drop
//! successors that fall outside the read window.
//!
//! An empty result means the process died (`DAT`, or division by zero).

use crate::core::{LimitKind, MemoryCore};
use crate::instruction::{Instruction, Modifier, Opcode, Pid};
use crate::operand::{apply_post_increment, resolve, ResolvedOperand};
use crate::tracer::Tracer;

/// Successor program counters of one executed instruction.
///
/// At most two entries (`SPL`); an empty set terminates the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NextPcs {
    pcs: [u32; 2],
    len: u8,
}

impl NextPcs {
    /// No successors: the process dies.
    #[must_use]
    pub const fn none() -> Self {
        Self { pcs: [0; 2], len: 0 }
    }

    /// A single successor.
    #[must_use]
    pub const fn one(pc: u32) -> Self {
        Self {
            pcs: [pc, 0],
            len: 1,
        }
    }

    /// Two successors in scheduling order.
    #[must_use]
    pub const fn two(first: u32, second: u32) -> Self {
        Self {
            pcs: [first, second],
            len: 2,
        }
    }

    fn push(&mut self, pc: u32) {
        debug_assert!(self.len < 2, "an instruction yields at most two successors");
        self.pcs[self.len as usize] = pc;
        self.len += 1;
    }

    /// Successors as a slice, in enqueue order.
    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.pcs[..self.len as usize]
    }

    /// Returns true when the process produced no successor.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Executes the instruction at `pc` and returns the PCs to enqueue.
pub fn execute(core: &mut MemoryCore, pc: u32, pid: Pid, tracer: &mut dyn Tracer) -> NextPcs {
    let instruction = *core.cell(pc);
    tracer.begin_instruction(pc, &instruction, pid);

    tracer.begin_a_operand();
    let a = resolve(core, pc, instruction.a_mode, instruction.a_field, pid, tracer);
    tracer.begin_b_operand();
    let b = resolve(core, pc, instruction.b_mode, instruction.b_field, pid, tracer);

    tracer.operation(instruction.opcode.mnemonic());
    let successors = dispatch(core, pc, pid, &instruction, &a, &b, tracer);

    apply_post_increment(core, &a, pc, pid, tracer);
    apply_post_increment(core, &b, pc, pid, tracer);

    let mut admitted = NextPcs::none();
    for &target in successors.as_slice() {
        if core.check_limit(LimitKind::Read, pc, target) {
            admitted.push(target);
        }
    }
    admitted
}

fn dispatch(
    core: &mut MemoryCore,
    pc: u32,
    pid: Pid,
    instruction: &Instruction,
    a: &ResolvedOperand,
    b: &ResolvedOperand,
    tracer: &mut dyn Tracer,
) -> NextPcs {
    let next = core.fold(i64::from(pc) + 1);
    let skip = core.fold(i64::from(pc) + 2);
    let jump = core.fold(i64::from(pc) + i64::from(a.pointer));
    let modifier = instruction.modifier;

    match instruction.opcode {
        Opcode::Dat => NextPcs::none(),
        Opcode::Nop => NextPcs::one(next),
        Opcode::Jmp => NextPcs::one(jump),
        Opcode::Spl => NextPcs::two(next, jump),
        Opcode::Mov => {
            mov(core, pc, pid, modifier, a, b, tracer);
            NextPcs::one(next)
        }
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => {
            if arithmetic(core, pc, pid, instruction.opcode, modifier, a, b, tracer) {
                NextPcs::one(next)
            } else {
                NextPcs::none()
            }
        }
        Opcode::Jmz => {
            if branch_fields(modifier, &b.target, |field| field == 0) {
                NextPcs::one(jump)
            } else {
                NextPcs::one(next)
            }
        }
        Opcode::Jmn => {
            if branch_fields(modifier, &b.target, |field| field != 0) {
                NextPcs::one(jump)
            } else {
                NextPcs::one(next)
            }
        }
        Opcode::Djn => {
            if decrement_and_test(core, pc, pid, modifier, b, tracer) {
                NextPcs::one(jump)
            } else {
                NextPcs::one(next)
            }
        }
        Opcode::Seq => {
            if compare_equal(modifier, &a.target, &b.target) {
                NextPcs::one(skip)
            } else {
                NextPcs::one(next)
            }
        }
        Opcode::Sne => {
            if compare_equal(modifier, &a.target, &b.target) {
                NextPcs::one(next)
            } else {
                NextPcs::one(skip)
            }
        }
        Opcode::Slt => {
            if compare_less(modifier, &a.target, &b.target) {
                NextPcs::one(skip)
            } else {
                NextPcs::one(next)
            }
        }
    }
}

fn mov(
    core: &mut MemoryCore,
    pc: u32,
    pid: Pid,
    modifier: Modifier,
    a: &ResolvedOperand,
    b: &ResolvedOperand,
    tracer: &mut dyn Tracer,
) {
    let mut cell = *core.cell(b.address);
    match modifier {
        Modifier::A => cell.a_field = a.target.a_field,
        Modifier::B => cell.b_field = a.target.b_field,
        Modifier::AB => cell.b_field = a.target.a_field,
        Modifier::BA => cell.a_field = a.target.b_field,
        Modifier::F => {
            cell.a_field = a.target.a_field;
            cell.b_field = a.target.b_field;
        }
        Modifier::X => {
            cell.a_field = a.target.b_field;
            cell.b_field = a.target.a_field;
        }
        Modifier::I => cell = a.target,
    }
    let _ = core.store(pc, b.address, cell, pid, tracer);
}

/// Applies one arithmetic opcode; returns false when the process must die
/// (division or modulo by zero in any attempted subfield).
#[allow(clippy::too_many_arguments)]
fn arithmetic(
    core: &mut MemoryCore,
    pc: u32,
    pid: Pid,
    opcode: Opcode,
    modifier: Modifier,
    a: &ResolvedOperand,
    b: &ResolvedOperand,
    tracer: &mut dyn Tracer,
) -> bool {
    fn combine(opcode: Opcode, lhs: i32, rhs: i32) -> Option<i64> {
        let (lhs, rhs) = (i64::from(lhs), i64::from(rhs));
        match opcode {
            Opcode::Add => Some(lhs + rhs),
            Opcode::Sub => Some(lhs - rhs),
            Opcode::Mul => Some(lhs * rhs),
            Opcode::Div => (rhs != 0).then(|| lhs / rhs),
            Opcode::Mod => (rhs != 0).then(|| lhs % rhs),
            _ => unreachable!("arithmetic dispatch only receives arithmetic opcodes"),
        }
    }

    // (writes-to-A-subfield, operand value) pairs; both entries of the
    // two-subfield forms are attempted even when the first divides by zero.
    let steps: [Option<(bool, i32)>; 2] = match modifier {
        Modifier::A => [Some((true, a.target.a_field)), None],
        Modifier::B => [Some((false, a.target.b_field)), None],
        Modifier::AB => [Some((false, a.target.a_field)), None],
        Modifier::BA => [Some((true, a.target.b_field)), None],
        Modifier::F | Modifier::I => [
            Some((true, a.target.a_field)),
            Some((false, a.target.b_field)),
        ],
        Modifier::X => [
            Some((true, a.target.b_field)),
            Some((false, a.target.a_field)),
        ],
    };

    let mut cell = *core.cell(b.address);
    let mut survived = true;
    let mut wrote = false;
    for (to_a_field, rhs) in steps.into_iter().flatten() {
        let lhs = if to_a_field { cell.a_field } else { cell.b_field };
        match combine(opcode, lhs, rhs) {
            Some(value) => {
                let folded = core.fold_field(value);
                if to_a_field {
                    cell.a_field = folded;
                } else {
                    cell.b_field = folded;
                }
                wrote = true;
            }
            None => survived = false,
        }
    }

    // When every attempted subfield divided by zero there is nothing to
    // commit; the target keeps its value and its owner.
    if wrote {
        let _ = core.store(pc, b.address, cell, pid, tracer);
    }
    survived
}

/// Tests the B-target fields selected by the modifier with `predicate`.
///
/// `F`/`X`/`I` require the predicate on both fields.
fn branch_fields(modifier: Modifier, target: &Instruction, predicate: impl Fn(i32) -> bool) -> bool {
    match modifier {
        Modifier::A | Modifier::BA => predicate(target.a_field),
        Modifier::B | Modifier::AB => predicate(target.b_field),
        Modifier::F | Modifier::X | Modifier::I => {
            predicate(target.a_field) && predicate(target.b_field)
        }
    }
}

/// Decrements the selected B-target field(s), then reports whether the
/// post-decrement value is nonzero (for both-field forms: not both zero).
fn decrement_and_test(
    core: &mut MemoryCore,
    pc: u32,
    pid: Pid,
    modifier: Modifier,
    b: &ResolvedOperand,
    tracer: &mut dyn Tracer,
) -> bool {
    let mut cell = *core.cell(b.address);
    let decrement = |core: &MemoryCore, field: i32| core.fold_field(i64::from(field) - 1);

    match modifier {
        Modifier::A | Modifier::BA => cell.a_field = decrement(core, cell.a_field),
        Modifier::B | Modifier::AB => cell.b_field = decrement(core, cell.b_field),
        Modifier::F | Modifier::X | Modifier::I => {
            cell.a_field = decrement(core, cell.a_field);
            cell.b_field = decrement(core, cell.b_field);
        }
    }
    let _ = core.store(pc, b.address, cell, pid, tracer);

    match modifier {
        Modifier::A | Modifier::BA => cell.a_field != 0,
        Modifier::B | Modifier::AB => cell.b_field != 0,
        Modifier::F | Modifier::X | Modifier::I => cell.a_field != 0 || cell.b_field != 0,
    }
}

fn compare_equal(modifier: Modifier, a: &Instruction, b: &Instruction) -> bool {
    match modifier {
        Modifier::A => a.a_field == b.a_field,
        Modifier::B => a.b_field == b.b_field,
        Modifier::AB => a.a_field == b.b_field,
        Modifier::BA => a.b_field == b.a_field,
        Modifier::F => a.a_field == b.a_field && a.b_field == b.b_field,
        Modifier::X => a.a_field == b.b_field && a.b_field == b.a_field,
        Modifier::I => a.same_image(b),
    }
}

fn compare_less(modifier: Modifier, a: &Instruction, b: &Instruction) -> bool {
    match modifier {
        Modifier::A => a.a_field < b.a_field,
        Modifier::B => a.b_field < b.b_field,
        Modifier::AB => a.a_field < b.b_field,
        Modifier::BA => a.b_field < b.a_field,
        // SLT has no whole-instruction ordering; `.I` reduces to `.F`.
        Modifier::F | Modifier::I => a.a_field < b.a_field && a.b_field < b.b_field,
        Modifier::X => a.a_field < b.b_field && a.b_field < b.a_field,
    }
}
