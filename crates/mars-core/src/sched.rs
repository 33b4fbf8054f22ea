//! Round scheduling: warrior placement, process queues, and the cycle loop.
//!
//! Each live warrior executes exactly one instruction per cycle, drawn from
//! the head of its process FIFO; successors are enqueued at the tail. A
//! warrior whose queue empties is dead for the rest of the round.

use std::collections::VecDeque;

use thiserror::Error;

use crate::config::{ConfigError, SimConfig};
use crate::core::MemoryCore;
use crate::execute::execute;
use crate::instruction::{Instruction, Pid};
use crate::program::Program;
use crate::tracer::Tracer;

/// One loaded warrior and its process queue.
#[derive(Debug, Clone)]
pub struct Warrior {
    /// Display name (metadata name or a generated fallback).
    pub name: String,
    /// Identifier assigned at load, starting at 1.
    pub pid: Pid,
    /// Core address of the warrior's first instruction.
    pub base: u32,
    /// Instruction count at load.
    pub length: usize,
    queue: VecDeque<u32>,
}

impl Warrior {
    /// Returns true while the warrior still has processes.
    #[must_use]
    pub fn alive(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Current process count.
    #[must_use]
    pub fn processes(&self) -> usize {
        self.queue.len()
    }

    /// Program counters in dequeue order.
    pub fn queue(&self) -> impl Iterator<Item = u32> + '_ {
        self.queue.iter().copied()
    }
}

/// Errors raised while loading warriors into a core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The program exceeds the configured instruction limit.
    #[error("warrior '{name}' is {length} instructions long, limit is {max_length}")]
    WarriorTooLong {
        /// Warrior display name.
        name: String,
        /// Offending instruction count.
        length: usize,
        /// Configured maximum.
        max_length: u32,
    },
    /// The base address violates separation against a loaded warrior.
    #[error("placement at {base} is within {min_distance} cells of the warrior at {other_base}")]
    OverlappingPlacement {
        /// Rejected base address.
        base: u32,
        /// Base of the conflicting warrior.
        other_base: u32,
        /// Configured minimum separation.
        min_distance: u32,
    },
    /// Seeded placement gave up finding a conforming base address.
    #[error("no conforming placement found for warrior {index}")]
    NoPlacement {
        /// Index of the warrior that could not be placed.
        index: usize,
    },
}

/// Result of a finished round.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RoundOutcome {
    /// Sole survivor of a multi-warrior round, if the round was decided.
    pub winner: Option<Pid>,
    /// Cycles executed.
    pub cycles: u32,
    /// Warriors still alive when the round ended.
    pub survivors: Vec<Pid>,
}

/// Status returned by one scheduler cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundStatus {
    /// The round continues.
    Running,
    /// The round ended with this outcome.
    Finished(RoundOutcome),
}

/// The simulator: core, warriors, and the cycle loop.
#[derive(Debug, Clone)]
pub struct Mars {
    config: SimConfig,
    core: MemoryCore,
    warriors: Vec<Warrior>,
    cycle: u32,
    outcome: Option<RoundOutcome>,
}

impl Mars {
    /// Creates an empty simulator for a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] from [`SimConfig::validate`].
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let core = MemoryCore::new(&config);
        Ok(Self {
            config,
            core,
            warriors: Vec::new(),
            cycle: 0,
            outcome: None,
        })
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The memory core.
    #[must_use]
    pub const fn core(&self) -> &MemoryCore {
        &self.core
    }

    /// Cycles executed so far.
    #[must_use]
    pub const fn cycle(&self) -> u32 {
        self.cycle
    }

    /// Loaded warriors in load order.
    #[must_use]
    pub fn warriors(&self) -> &[Warrior] {
        &self.warriors
    }

    /// Loads a warrior at an explicit base address.
    ///
    /// The program's cells are tagged with the new PID and its single
    /// initial process starts at `base + program.start`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::WarriorTooLong`] or
    /// [`LoadError::OverlappingPlacement`].
    pub fn load_at(&mut self, program: &Program, base: u32) -> Result<Pid, LoadError> {
        let name = program
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| format!("warrior {}", self.warriors.len() + 1));

        if program.len() > self.config.max_length as usize {
            return Err(LoadError::WarriorTooLong {
                name,
                length: program.len(),
                max_length: self.config.max_length,
            });
        }

        let base = self.core.fold(i64::from(base));
        if let Some(other) = self
            .warriors
            .iter()
            .find(|warrior| !self.separated(base, warrior.base))
        {
            return Err(LoadError::OverlappingPlacement {
                base,
                other_base: other.base,
                min_distance: self.config.min_distance,
            });
        }

        let pid = Pid(u32::try_from(self.warriors.len()).expect("warrior count fits u32") + 1);
        for (offset, instruction) in program.instructions.iter().enumerate() {
            let address = self.core.fold(i64::from(base) + offset as i64);
            self.core.write_cell(address, Instruction { pid, ..*instruction });
        }

        let entry = self.core.fold(i64::from(base) + program.start as i64);
        self.warriors.push(Warrior {
            name,
            pid,
            base,
            length: program.len(),
            queue: VecDeque::from([entry]),
        });
        Ok(pid)
    }

    /// Loads warriors at seed-determined base addresses.
    ///
    /// The first warrior is placed at address 0; each later one gets
    /// candidate addresses from a xorshift stream until separation holds.
    /// The same seed and warrior list always produce the same placement.
    ///
    /// # Errors
    ///
    /// Returns a [`LoadError`] when a warrior is too long or no conforming
    /// base is found.
    pub fn load_all(&mut self, programs: &[Program], seed: u64) -> Result<Vec<Pid>, LoadError> {
        let mut rng = if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed };
        let mut pids = Vec::with_capacity(programs.len());

        for (index, program) in programs.iter().enumerate() {
            if index == 0 {
                pids.push(self.load_at(program, 0)?);
                continue;
            }

            let mut placed = None;
            for _ in 0..10_000 {
                rng ^= rng << 13;
                rng ^= rng >> 7;
                rng ^= rng << 17;
                let candidate = u32::try_from(rng % u64::from(self.core.size()))
                    .expect("residue below core size");
                if self
                    .warriors
                    .iter()
                    .all(|warrior| self.separated(candidate, warrior.base))
                {
                    placed = Some(candidate);
                    break;
                }
            }
            let base = placed.ok_or(LoadError::NoPlacement { index })?;
            pids.push(self.load_at(program, base)?);
        }
        Ok(pids)
    }

    /// True when two base addresses are at least `min_distance` apart in
    /// both circular directions.
    fn separated(&self, a: u32, b: u32) -> bool {
        let forward = self.core.fold(i64::from(b) - i64::from(a));
        let backward = self.core.fold(i64::from(a) - i64::from(b));
        forward >= self.config.min_distance && backward >= self.config.min_distance
    }

    /// Runs one cycle: every live warrior executes one instruction.
    ///
    /// The host may stop between cycles at will; partial state (cycle
    /// count, live warriors) stays observable through the accessors.
    pub fn step_cycle(&mut self, tracer: &mut dyn Tracer) -> RoundStatus {
        if let Some(outcome) = &self.outcome {
            return RoundStatus::Finished(outcome.clone());
        }

        self.cycle += 1;
        tracer.cycle(self.cycle);

        for index in 0..self.warriors.len() {
            let Some(pc) = self.warriors[index].queue.pop_front() else {
                continue;
            };
            let pid = self.warriors[index].pid;
            let successors = execute(&mut self.core, pc, pid, tracer);

            let warrior = &mut self.warriors[index];
            for &successor in successors.as_slice() {
                // A fork past the process ceiling is dropped silently; the
                // parent (enqueued first) still advances.
                if warrior.queue.len() < self.config.max_processes as usize {
                    warrior.queue.push_back(successor);
                }
            }
            let snapshot: Vec<u32> = warrior.queue.iter().copied().collect();
            tracer.program_counters(&snapshot);
        }

        self.check_termination()
    }

    fn check_termination(&mut self) -> RoundStatus {
        let survivors: Vec<Pid> = self
            .warriors
            .iter()
            .filter(|warrior| warrior.alive())
            .map(|warrior| warrior.pid)
            .collect();

        let decided = if self.warriors.len() > 1 && survivors.len() <= 1 {
            // Last warrior standing wins; mutual destruction is a draw.
            Some(RoundOutcome {
                winner: survivors.first().copied(),
                cycles: self.cycle,
                survivors: survivors.clone(),
            })
        } else if survivors.is_empty() || self.cycle >= self.config.max_cycles {
            Some(RoundOutcome {
                winner: None,
                cycles: self.cycle,
                survivors,
            })
        } else {
            None
        };

        match decided {
            Some(outcome) => {
                self.outcome = Some(outcome.clone());
                RoundStatus::Finished(outcome)
            }
            None => RoundStatus::Running,
        }
    }

    /// Runs cycles until the round ends and returns the outcome.
    pub fn run_round(&mut self, tracer: &mut dyn Tracer) -> RoundOutcome {
        loop {
            if let RoundStatus::Finished(outcome) = self.step_cycle(tracer) {
                return outcome;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LoadError, Mars, RoundStatus};
    use crate::config::SimConfig;
    use crate::instruction::{AddressMode, Instruction, Modifier, Opcode, Pid};
    use crate::program::Program;
    use crate::tracer::NullTracer;

    fn instruction(
        opcode: Opcode,
        modifier: Modifier,
        a_mode: AddressMode,
        a: i32,
        b_mode: AddressMode,
        b: i32,
    ) -> Instruction {
        Instruction {
            pid: Pid::UNOWNED,
            opcode,
            modifier,
            a_mode,
            a_field: a,
            b_mode,
            b_field: b,
        }
    }

    fn imp() -> Program {
        Program {
            instructions: vec![instruction(
                Opcode::Mov,
                Modifier::I,
                AddressMode::Direct,
                0,
                AddressMode::Direct,
                1,
            )],
            ..Program::default()
        }
    }

    fn splitter() -> Program {
        Program {
            instructions: vec![instruction(
                Opcode::Spl,
                Modifier::B,
                AddressMode::Direct,
                0,
                AddressMode::Immediate,
                0,
            )],
            ..Program::default()
        }
    }

    fn small_config() -> SimConfig {
        SimConfig {
            core_size: 800,
            max_cycles: 100,
            max_processes: 8,
            max_length: 10,
            min_distance: 10,
            read_limit: 800,
            write_limit: 800,
        }
    }

    #[test]
    fn load_tags_cells_and_seeds_one_process() {
        let mut mars = Mars::new(small_config()).expect("valid config");
        let pid = mars.load_at(&imp(), 100).expect("load");
        assert_eq!(pid, Pid(1));
        assert_eq!(mars.core().cell(100).pid, Pid(1));
        assert_eq!(mars.core().cell(100).opcode, Opcode::Mov);

        let warrior = &mars.warriors()[0];
        assert!(warrior.alive());
        assert_eq!(warrior.processes(), 1);
        assert_eq!(warrior.queue().collect::<Vec<_>>(), vec![100]);
    }

    #[test]
    fn start_offset_shifts_the_initial_process() {
        let mut mars = Mars::new(small_config()).expect("valid config");
        let program = Program {
            instructions: vec![
                instruction(
                    Opcode::Dat,
                    Modifier::F,
                    AddressMode::Immediate,
                    0,
                    AddressMode::Immediate,
                    0,
                ),
                instruction(
                    Opcode::Jmp,
                    Modifier::B,
                    AddressMode::Direct,
                    0,
                    AddressMode::Immediate,
                    0,
                ),
            ],
            start: 1,
            ..Program::default()
        };
        mars.load_at(&program, 50).expect("load");
        assert_eq!(mars.warriors()[0].queue().collect::<Vec<_>>(), vec![51]);
    }

    #[test]
    fn too_long_warrior_is_rejected() {
        let mut mars = Mars::new(small_config()).expect("valid config");
        let long = Program {
            instructions: vec![Instruction::initial(); 11],
            ..Program::default()
        };
        let err = mars.load_at(&long, 0).expect_err("must reject");
        assert!(matches!(err, LoadError::WarriorTooLong { length: 11, .. }));
    }

    #[test]
    fn close_placement_is_rejected() {
        let mut mars = Mars::new(small_config()).expect("valid config");
        mars.load_at(&imp(), 100).expect("first load");
        let err = mars.load_at(&imp(), 105).expect_err("too close");
        assert!(matches!(
            err,
            LoadError::OverlappingPlacement {
                base: 105,
                other_base: 100,
                ..
            }
        ));
        // Wraparound distance counts too.
        let err = mars.load_at(&imp(), 95).expect_err("too close behind");
        assert!(matches!(err, LoadError::OverlappingPlacement { .. }));
        mars.load_at(&imp(), 110).expect("far enough");
    }

    #[test]
    fn seeded_placement_is_deterministic_and_separated() {
        let build = |seed| {
            let mut mars = Mars::new(small_config()).expect("valid config");
            mars.load_all(&[imp(), imp(), imp()], seed).expect("place");
            mars.warriors()
                .iter()
                .map(|warrior| warrior.base)
                .collect::<Vec<_>>()
        };

        let first = build(42);
        assert_eq!(first, build(42));
        assert_eq!(first[0], 0);

        let mars = {
            let mut mars = Mars::new(small_config()).expect("valid config");
            mars.load_all(&[imp(), imp(), imp()], 42).expect("place");
            mars
        };
        let bases: Vec<u32> = mars.warriors().iter().map(|warrior| warrior.base).collect();
        for (i, &a) in bases.iter().enumerate() {
            for &b in &bases[i + 1..] {
                let forward = mars.core().fold(i64::from(b) - i64::from(a));
                let backward = mars.core().fold(i64::from(a) - i64::from(b));
                assert!(forward >= 10 && backward >= 10, "bases {a} and {b} too close");
            }
        }
    }

    #[test]
    fn lone_warrior_survives_to_the_cycle_cap() {
        let mut mars = Mars::new(small_config()).expect("valid config");
        mars.load_at(&imp(), 100).expect("load");
        let outcome = mars.run_round(&mut NullTracer);
        assert_eq!(outcome.cycles, 100);
        assert_eq!(outcome.winner, None);
        assert_eq!(outcome.survivors, vec![Pid(1)]);
    }

    #[test]
    fn lone_warrior_dying_ends_the_round_early() {
        let mut mars = Mars::new(small_config()).expect("valid config");
        let suicide = Program {
            instructions: vec![Instruction::initial()],
            ..Program::default()
        };
        mars.load_at(&suicide, 0).expect("load");
        let outcome = mars.run_round(&mut NullTracer);
        assert_eq!(outcome.cycles, 1);
        assert_eq!(outcome.winner, None);
        assert!(outcome.survivors.is_empty());
    }

    #[test]
    fn survivor_wins_when_the_other_warrior_dies() {
        let mut mars = Mars::new(small_config()).expect("valid config");
        let suicide = Program {
            instructions: vec![Instruction::initial()],
            ..Program::default()
        };
        mars.load_at(&imp(), 0).expect("imp");
        mars.load_at(&suicide, 400).expect("suicide");
        let outcome = mars.run_round(&mut NullTracer);
        assert_eq!(outcome.cycles, 1);
        assert_eq!(outcome.winner, Some(Pid(1)));
        assert_eq!(outcome.survivors, vec![Pid(1)]);
    }

    #[test]
    fn spl_grows_one_process_per_cycle_up_to_the_cap() {
        let mut mars = Mars::new(small_config()).expect("valid config");
        mars.load_at(&splitter(), 0).expect("load");

        for expected in 2..=8 {
            assert_eq!(mars.step_cycle(&mut NullTracer), RoundStatus::Running);
            assert_eq!(mars.warriors()[0].processes(), expected);
        }
        // At the cap the child is dropped but the parent still advances.
        assert_eq!(mars.step_cycle(&mut NullTracer), RoundStatus::Running);
        assert_eq!(mars.warriors()[0].processes(), 8);
    }

    #[test]
    fn each_live_warrior_executes_once_per_cycle() {
        let mut mars = Mars::new(small_config()).expect("valid config");
        mars.load_at(&splitter(), 0).expect("splitter");
        mars.load_at(&imp(), 400).expect("imp");

        for cycle in 1..=5 {
            mars.step_cycle(&mut NullTracer);
            // The imp advances exactly one cell per cycle no matter how many
            // processes the splitter has accumulated.
            assert_eq!(
                mars.warriors()[1].queue().collect::<Vec<_>>(),
                vec![400 + cycle]
            );
        }
    }

    #[test]
    fn step_cycle_after_finish_repeats_the_outcome() {
        let mut mars = Mars::new(small_config()).expect("valid config");
        let suicide = Program {
            instructions: vec![Instruction::initial()],
            ..Program::default()
        };
        mars.load_at(&suicide, 0).expect("load");
        let first = mars.run_round(&mut NullTracer);
        match mars.step_cycle(&mut NullTracer) {
            RoundStatus::Finished(again) => assert_eq!(again, first),
            RoundStatus::Running => panic!("round must stay finished"),
        }
        assert_eq!(mars.cycle(), 1);
    }
}
