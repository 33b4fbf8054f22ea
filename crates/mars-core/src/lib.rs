//! Core simulator crate for the Memory Array Redcode Simulator.
//!
//! Warriors assembled into [`Program`]s are loaded into a circular
//! [`MemoryCore`] and fought under the round-robin [`Mars`] scheduler, one
//! instruction per live warrior per cycle. Execution is single-threaded and
//! deterministic; observers attach through the [`Tracer`] interface.

/// Instruction value model: opcodes, modifiers, addressing modes.
pub mod instruction;
pub use instruction::{AddressMode, Instruction, Modifier, Opcode, Pid, MNEMONIC_TABLE};

/// Simulation configuration and the standard tournament constants.
pub mod config;
pub use config::{
    ConfigError, SimConfig, DEFAULT_CORE_SIZE, DEFAULT_MAX_CYCLES, DEFAULT_MAX_LENGTH,
    DEFAULT_MAX_PROCESSES, DEFAULT_MIN_DISTANCE,
};

/// The circular instruction memory.
pub mod core;
pub use crate::core::{LimitKind, MemoryCore};

/// Runtime operand resolution with addressing-mode side effects.
pub mod operand;
pub use operand::{apply_post_increment, resolve, FieldSelector, ResolvedOperand};

/// Per-opcode execution semantics.
pub mod execute;
pub use execute::{execute, NextPcs};

/// Assembled, position-independent warriors.
pub mod program;
pub use program::{Metadata, Program};

/// Round scheduling and warrior placement.
pub mod sched;
pub use sched::{LoadError, Mars, RoundOutcome, RoundStatus, Warrior};

/// Push-style execution tracing.
pub mod tracer;
pub use tracer::{
    CellAccess, NullTracer, OperandTrace, RecordingTracer, TraceRecord, Tracer, CSV_HEADER,
};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
