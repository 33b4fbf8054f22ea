//! Push-style execution tracing.
//!
//! The executor and memory core report loads, stores, operand resolution,
//! and scheduling snapshots through the [`Tracer`] trait. [`NullTracer`]
//! drops everything; [`RecordingTracer`] keeps bounded ring buffers of
//! per-instruction records and exports them as CSV.
//!
//! Tracers only ever see copies; they never own or mutate core state.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::fmt::Write as _;

use crate::instruction::{Instruction, Pid};

/// Observer hooks invoked at well-defined execution points.
///
/// All hooks have empty default bodies, so an implementation overrides only
/// what it needs.
pub trait Tracer {
    /// A new cycle begins.
    fn cycle(&mut self, _n: u32) {}

    /// An instruction is about to execute.
    fn begin_instruction(&mut self, _address: u32, _instruction: &Instruction, _pid: Pid) {}

    /// Subsequent loads/stores belong to A-operand resolution.
    fn begin_a_operand(&mut self) {}

    /// Subsequent loads/stores belong to B-operand resolution.
    fn begin_b_operand(&mut self) {}

    /// An operand resolved to `pointer` with the given target snapshot;
    /// `post_increment` carries the pointer cell when an increment is
    /// pending for after the opcode.
    fn log_operand(
        &mut self,
        _pointer: i32,
        _target: &Instruction,
        _post_increment: Option<&Instruction>,
    ) {
    }

    /// A cell was read.
    fn log_load(&mut self, _address: u32, _instruction: &Instruction) {}

    /// A cell was written.
    fn log_store(&mut self, _address: u32, _instruction: &Instruction) {}

    /// Opcode dispatch begins; loads/stores from here on are opcode effects.
    fn operation(&mut self, _text: &str) {}

    /// The owning warrior's process queue after successors were enqueued.
    fn program_counters(&mut self, _queue: &[u32]) {}
}

/// Tracer that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTracer;

impl Tracer for NullTracer {}

/// One traced load or store with its address.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CellAccess {
    /// Core address of the access.
    pub address: u32,
    /// The cell value read or written.
    pub instruction: Instruction,
}

/// Loads and stores observed while resolving one operand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct OperandTrace {
    /// Resolved relative pointer.
    pub pointer: Option<i32>,
    /// Indirection reads, in order (at most two per operand).
    pub loads: Vec<CellAccess>,
    /// Pre-decrement write, if the mode had one.
    pub store: Option<CellAccess>,
}

/// Everything observed for one executed instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TraceRecord {
    /// Cycle number during which the instruction executed.
    pub cycle: u32,
    /// Executing warrior.
    pub pid: Pid,
    /// Address of the executed instruction.
    pub address: u32,
    /// The executed instruction image.
    pub instruction: Instruction,
    /// A-operand resolution trail.
    pub a: OperandTrace,
    /// B-operand resolution trail.
    pub b: OperandTrace,
    /// Opcode-phase stores (at most two: post-increments land here too).
    pub stores: Vec<CellAccess>,
    /// Short opcode-phase description.
    pub operation: String,
    /// Process queue snapshot after enqueueing successors.
    pub pcs: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AOperand,
    BOperand,
    Operation,
}

/// Column header of the CSV trace export.
pub const CSV_HEADER: &str = "Cycle;PID;Address;Instruction;A-Pointer;A-Load1;A-Load2;A-Store;\
B-Pointer;B-Load1;B-Load2;B-Store;Store1;Store2;PCS";

/// Default capacity of the global record ring.
pub const DEFAULT_GLOBAL_CAPACITY: usize = 1024;
/// Default capacity of each per-warrior record ring.
pub const DEFAULT_PER_PID_CAPACITY: usize = 128;

/// Tracer keeping bounded rings of [`TraceRecord`]s.
///
/// The global ring and each per-PID ring drop their oldest record when
/// full.
#[derive(Debug, Clone)]
pub struct RecordingTracer {
    global_capacity: usize,
    per_pid_capacity: usize,
    records: VecDeque<TraceRecord>,
    per_pid: HashMap<Pid, VecDeque<TraceRecord>>,
    cycle: u32,
    current: Option<TraceRecord>,
    phase: Phase,
}

impl Default for RecordingTracer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_GLOBAL_CAPACITY, DEFAULT_PER_PID_CAPACITY)
    }
}

impl RecordingTracer {
    /// Creates a recorder with default ring capacities.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recorder with explicit global and per-PID ring capacities.
    #[must_use]
    pub fn with_capacity(global: usize, per_pid: usize) -> Self {
        Self {
            global_capacity: global.max(1),
            per_pid_capacity: per_pid.max(1),
            records: VecDeque::new(),
            per_pid: HashMap::new(),
            cycle: 0,
            current: None,
            phase: Phase::AOperand,
        }
    }

    /// Finishes the in-flight record, if any.
    pub fn flush(&mut self) {
        if let Some(record) = self.current.take() {
            let ring = self.per_pid.entry(record.pid).or_default();
            if ring.len() == self.per_pid_capacity {
                ring.pop_front();
            }
            ring.push_back(record.clone());

            if self.records.len() == self.global_capacity {
                self.records.pop_front();
            }
            self.records.push_back(record);
        }
    }

    /// All retained records, oldest first.
    #[must_use]
    pub fn records(&self) -> &VecDeque<TraceRecord> {
        &self.records
    }

    /// Retained records for one warrior, oldest first.
    #[must_use]
    pub fn records_for(&self, pid: Pid) -> Option<&VecDeque<TraceRecord>> {
        self.per_pid.get(&pid)
    }

    /// Renders all retained records as semicolon-separated CSV.
    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        out.push_str(CSV_HEADER);
        out.push('\n');
        for record in &self.records {
            render_csv_row(&mut out, record);
            out.push('\n');
        }
        out
    }

    fn current_operand(&mut self) -> Option<&mut OperandTrace> {
        let phase = self.phase;
        self.current.as_mut().map(|record| match phase {
            Phase::AOperand => &mut record.a,
            // log_operand never fires during the opcode phase; fall back to B.
            Phase::BOperand | Phase::Operation => &mut record.b,
        })
    }
}

fn render_access(access: Option<&CellAccess>) -> String {
    access.map_or_else(String::new, |a| {
        format!("{}: {}", a.address, a.instruction)
    })
}

fn render_csv_row(out: &mut String, record: &TraceRecord) {
    let pointer = |p: Option<i32>| p.map_or_else(String::new, |v| v.to_string());
    let pcs = record
        .pcs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");

    let _ = write!(
        out,
        "{};{};{};{};{};{};{};{};{};{};{};{};{};{};{}",
        record.cycle,
        record.pid,
        record.address,
        record.instruction,
        pointer(record.a.pointer),
        render_access(record.a.loads.first()),
        render_access(record.a.loads.get(1)),
        render_access(record.a.store.as_ref()),
        pointer(record.b.pointer),
        render_access(record.b.loads.first()),
        render_access(record.b.loads.get(1)),
        render_access(record.b.store.as_ref()),
        render_access(record.stores.first()),
        render_access(record.stores.get(1)),
        pcs,
    );
}

impl Tracer for RecordingTracer {
    fn cycle(&mut self, n: u32) {
        self.cycle = n;
    }

    fn begin_instruction(&mut self, address: u32, instruction: &Instruction, pid: Pid) {
        self.flush();
        self.phase = Phase::AOperand;
        self.current = Some(TraceRecord {
            cycle: self.cycle,
            pid,
            address,
            instruction: *instruction,
            a: OperandTrace::default(),
            b: OperandTrace::default(),
            stores: Vec::new(),
            operation: String::new(),
            pcs: Vec::new(),
        });
    }

    fn begin_a_operand(&mut self) {
        self.phase = Phase::AOperand;
    }

    fn begin_b_operand(&mut self) {
        self.phase = Phase::BOperand;
    }

    fn log_operand(
        &mut self,
        pointer: i32,
        _target: &Instruction,
        _post_increment: Option<&Instruction>,
    ) {
        if let Some(operand) = self.current_operand() {
            operand.pointer = Some(pointer);
        }
    }

    fn log_load(&mut self, address: u32, instruction: &Instruction) {
        if self.phase == Phase::Operation {
            return;
        }
        if let Some(operand) = self.current_operand() {
            operand.loads.push(CellAccess {
                address,
                instruction: *instruction,
            });
        }
    }

    fn log_store(&mut self, address: u32, instruction: &Instruction) {
        let access = CellAccess {
            address,
            instruction: *instruction,
        };
        if self.phase == Phase::Operation {
            if let Some(record) = self.current.as_mut() {
                record.stores.push(access);
            }
        } else if let Some(operand) = self.current_operand() {
            operand.store = Some(access);
        }
    }

    fn operation(&mut self, text: &str) {
        self.phase = Phase::Operation;
        if let Some(record) = self.current.as_mut() {
            record.operation = text.to_string();
        }
    }

    fn program_counters(&mut self, queue: &[u32]) {
        if let Some(record) = self.current.as_mut() {
            record.pcs = queue.to_vec();
        }
        self.flush();
    }
}
