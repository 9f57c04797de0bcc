//! A small register-based bytecode for boolean circuit programs.
//!
//! Secret registers hold wire labels, clear registers hold 64-bit values that are either public
//! constants or values revealed by the circuit. Both parties run the same [`Program`] on their own
//! [`Processor`] and [`Memory`], passing their role as the [`Backend`] that garbles or evaluates
//! the boolean gates.
//!
//! A revealed value is *pending* until it has been opened to both parties. Any instruction that
//! needs a pending value to decide a memory address or a jump taints the processor and does
//! nothing; [`Program::execute`] then stops with [`Break::Restart`] so that the role can exchange
//! the pending openings and re-execute the instruction.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    data_types::Label,
    protocol::{Error, ProtocolViolation},
    taint::{Checkpoint, TaintTracker},
};

/// The index of a secret (label) register.
pub type Reg = usize;
/// The index of a clear register.
pub type ClearReg = usize;

/// The maximum number of wires that can be revealed as a single clear value.
pub const MAX_REVEAL_WIDTH: usize = 64;

/// Secret and clear register indices must be below this bound.
pub const MAX_REGISTERS: usize = 1 << 24;

/// A single bytecode instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Reads the next garbler input bit into a secret register.
    InputGarbler(Reg),
    /// Reads the next evaluator input bit into a secret register.
    InputEvaluator(Reg),
    /// `dst = lhs ^ rhs`
    Xor {
        /// Output register.
        dst: Reg,
        /// Left input.
        lhs: Reg,
        /// Right input.
        rhs: Reg,
    },
    /// `dst = lhs & rhs`
    And {
        /// Output register.
        dst: Reg,
        /// Left input.
        lhs: Reg,
        /// Right input.
        rhs: Reg,
    },
    /// `dst = !src`
    Not {
        /// Output register.
        dst: Reg,
        /// Input register.
        src: Reg,
    },
    /// Reveals the wires `src` (least significant bit first) to both parties as a clear value.
    Reveal {
        /// Clear register receiving the revealed value.
        dst: ClearReg,
        /// The wires to reveal.
        src: Vec<Reg>,
    },
    /// Reveals the wires (least significant bit first) to the evaluator only.
    PrivateOutput(Vec<Reg>),
    /// Sets a clear register to a public constant.
    SetClear {
        /// Clear register.
        dst: ClearReg,
        /// The public value.
        value: u64,
    },
    /// `memory[base + clear[offset]] = src`
    StoreDyn {
        /// The secret register to store.
        src: Reg,
        /// The static part of the address.
        base: usize,
        /// The clear register holding the dynamic offset.
        offset: ClearReg,
    },
    /// `dst = memory[base + clear[offset]]`
    LoadDyn {
        /// Output register.
        dst: Reg,
        /// The static part of the address.
        base: usize,
        /// The clear register holding the dynamic offset.
        offset: ClearReg,
    },
    /// Jumps to `target` if the clear register `cond` is zero.
    JumpIfZero {
        /// The clear register holding the condition.
        cond: ClearReg,
        /// The instruction to jump to.
        target: usize,
    },
    /// Jumps unconditionally.
    Jump(usize),
}

/// Why [`Program::execute`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Break {
    /// The instruction budget of the slice is used up.
    Time,
    /// The program has finished.
    Done,
    /// The last instruction was tainted and must be executed again after the pending values have
    /// been opened. The program counter already points past it.
    Restart,
}

/// Errors raised by malformed programs or by running out of inputs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterpreterError {
    /// A secret register was read before it was written.
    #[error("secret register {0} is uninitialized")]
    UninitializedRegister(Reg),
    /// A clear register was read before it was written.
    #[error("clear register {0} is uninitialized")]
    UninitializedClear(ClearReg),
    /// A dynamic address is outside of the program's memory.
    #[error("memory address {address} is out of bounds (memory size {size})")]
    MemoryOutOfBounds {
        /// The computed address.
        address: u64,
        /// The size of the memory.
        size: usize,
    },
    /// A memory cell was loaded before it was stored.
    #[error("memory cell {0} is uninitialized")]
    UninitializedMemory(usize),
    /// A jump target is outside of the program.
    #[error("instruction {instruction} jumps to {target}, past the end of the program")]
    InvalidJump {
        /// The index of the jump instruction.
        instruction: usize,
        /// The invalid target.
        target: usize,
    },
    /// A register index is not below [`MAX_REGISTERS`].
    #[error("instruction {instruction} uses register {register} (at most {MAX_REGISTERS} registers)")]
    RegisterOutOfRange {
        /// The index of the instruction.
        instruction: usize,
        /// The offending register index.
        register: usize,
    },
    /// More wires than fit into a clear value were revealed at once.
    #[error("instruction {instruction} reveals {width} wires (at most {MAX_REVEAL_WIDTH})")]
    RevealTooWide {
        /// The index of the reveal instruction.
        instruction: usize,
        /// The number of revealed wires.
        width: usize,
    },
    /// The garbler ran out of input bits.
    #[error("the garbler has no input bit left")]
    MissingGarblerInput,
    /// The evaluator ran out of input bits.
    #[error("the evaluator has no input bit left")]
    MissingEvaluatorInput,
}

/// The role-specific implementation of the boolean gates.
pub trait Backend {
    /// Returns the label of the next garbler input wire.
    fn input_garbler(&mut self) -> Result<Label, Error>;
    /// Returns the label of the next evaluator input wire.
    fn input_evaluator(&mut self) -> Result<Label, Error>;
    /// Garbles or evaluates an AND gate.
    fn and(&mut self, lhs: Label, rhs: Label) -> Result<Label, Error>;
    /// XOR gates are free for both roles.
    fn xor(&mut self, lhs: Label, rhs: Label) -> Label {
        lhs ^ rhs
    }
    /// Garbles or evaluates a NOT gate.
    fn not(&mut self, src: Label) -> Label;
    /// Reveals the wires to both parties. Returns the clear value if it is already known locally.
    fn reveal(&mut self, wires: &[Label]) -> Result<Option<u64>, Error>;
    /// Reveals the wires to the evaluator only.
    fn private_output(&mut self, wires: &[Label]) -> Result<(), Error>;
}

/// A validated program together with the size of the memory it addresses.
///
/// Deserialization goes through [`Program::new`], so a deserialized program is validated too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawProgram", into = "RawProgram")]
pub struct Program {
    instructions: Vec<Instruction>,
    memory_size: usize,
    secret_registers: usize,
    clear_registers: usize,
}

/// The serialized form of a [`Program`], without the derived register counts.
#[derive(Serialize, Deserialize)]
struct RawProgram {
    instructions: Vec<Instruction>,
    memory_size: usize,
}

impl TryFrom<RawProgram> for Program {
    type Error = InterpreterError;

    fn try_from(raw: RawProgram) -> Result<Self, Self::Error> {
        Program::new(raw.instructions, raw.memory_size)
    }
}

impl From<Program> for RawProgram {
    fn from(program: Program) -> Self {
        RawProgram {
            instructions: program.instructions,
            memory_size: program.memory_size,
        }
    }
}

impl Program {
    /// Validates the instructions and computes the number of registers the program uses.
    pub fn new(instructions: Vec<Instruction>, memory_size: usize) -> Result<Self, InterpreterError> {
        let mut secret_registers = 0;
        let mut clear_registers = 0;
        let len = instructions.len();
        for (i, instr) in instructions.iter().enumerate() {
            let (secret, clear): (Vec<Reg>, Vec<ClearReg>) = match instr {
                Instruction::InputGarbler(dst) | Instruction::InputEvaluator(dst) => {
                    (vec![*dst], vec![])
                }
                Instruction::Xor { dst, lhs, rhs } | Instruction::And { dst, lhs, rhs } => {
                    (vec![*dst, *lhs, *rhs], vec![])
                }
                Instruction::Not { dst, src } => (vec![*dst, *src], vec![]),
                Instruction::Reveal { dst, src } => {
                    if src.len() > MAX_REVEAL_WIDTH {
                        return Err(InterpreterError::RevealTooWide {
                            instruction: i,
                            width: src.len(),
                        });
                    }
                    (src.clone(), vec![*dst])
                }
                Instruction::PrivateOutput(src) => {
                    if src.len() > MAX_REVEAL_WIDTH {
                        return Err(InterpreterError::RevealTooWide {
                            instruction: i,
                            width: src.len(),
                        });
                    }
                    (src.clone(), vec![])
                }
                Instruction::SetClear { dst, .. } => (vec![], vec![*dst]),
                Instruction::StoreDyn { src: reg, offset, .. }
                | Instruction::LoadDyn {
                    dst: reg, offset, ..
                } => (vec![*reg], vec![*offset]),
                Instruction::JumpIfZero { cond, target } => {
                    if *target > len {
                        return Err(InterpreterError::InvalidJump {
                            instruction: i,
                            target: *target,
                        });
                    }
                    (vec![], vec![*cond])
                }
                Instruction::Jump(target) => {
                    if *target > len {
                        return Err(InterpreterError::InvalidJump {
                            instruction: i,
                            target: *target,
                        });
                    }
                    (vec![], vec![])
                }
            };
            for (registers, count) in [
                (&secret, &mut secret_registers),
                (&clear, &mut clear_registers),
            ] {
                let Some(&max) = registers.iter().max() else {
                    continue;
                };
                let bound = max
                    .checked_add(1)
                    .filter(|bound| *bound <= MAX_REGISTERS)
                    .ok_or(InterpreterError::RegisterOutOfRange {
                        instruction: i,
                        register: max,
                    })?;
                *count = (*count).max(bound);
            }
        }
        Ok(Self {
            instructions,
            memory_size,
            secret_registers,
            clear_registers,
        })
    }

    /// The instructions of the program.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// The number of memory cells addressed by the program.
    pub fn memory_size(&self) -> usize {
        self.memory_size
    }

    /// Creates a fresh processor with all registers of the program uninitialized.
    pub fn processor(&self) -> Processor {
        Processor {
            pc: 0,
            secret: vec![None; self.secret_registers],
            clear: vec![ClearCell::Unset; self.clear_registers],
            reveals: RevealLog::default(),
            taint: TaintTracker::default(),
        }
    }

    /// Creates a fresh, uninitialized memory for the program.
    pub fn memory(&self) -> Memory {
        Memory {
            cells: vec![None; self.memory_size],
        }
    }

    /// Executes at most `budget` instructions, starting at the processor's program counter.
    ///
    /// The taint flag is checked after every instruction. A tainted instruction stops the slice
    /// with [`Break::Restart`] before anything produced by the slice leaves the role.
    pub fn execute(
        &self,
        processor: &mut Processor,
        memory: &mut Memory,
        backend: &mut impl Backend,
        budget: usize,
    ) -> Result<Break, Error> {
        let mut steps = 0;
        while let Some(instr) = self.instructions.get(processor.pc) {
            if steps == budget {
                return Ok(Break::Time);
            }
            processor.pc += 1;
            processor.step(instr, memory, backend)?;
            steps += 1;
            if processor.taint.checkpoint() == Checkpoint::RestartRequested {
                trace!(pc = processor.pc - 1, "instruction depends on a pending value");
                return Ok(Break::Restart);
            }
        }
        Ok(Break::Done)
    }
}

/// The state of a clear register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClearCell {
    Unset,
    Public(u64),
    /// Index into the [`RevealLog`].
    Revealed(usize),
}

/// All values revealed so far, in program order.
///
/// Values before the `opened` watermark are known to both parties.
#[derive(Debug, Clone, Default)]
struct RevealLog {
    values: Vec<Option<u64>>,
    opened: usize,
}

/// The registers, program counter and taint flag of one party.
#[derive(Debug, Clone)]
pub struct Processor {
    pc: usize,
    secret: Vec<Option<Label>>,
    clear: Vec<ClearCell>,
    reveals: RevealLog,
    taint: TaintTracker,
}

impl Processor {
    /// The index of the next instruction.
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Moves the program counter back to the instruction that caused a restart.
    pub fn rewind(&mut self) {
        self.pc = self.pc.saturating_sub(1);
    }

    /// Returns the values revealed since the last exchange and marks them as opened.
    ///
    /// Only the evaluator knows the revealed values before they are opened.
    pub(crate) fn take_openings(&mut self) -> Vec<u64> {
        let pending = self.reveals.values[self.reveals.opened..]
            .iter()
            .flatten()
            .copied()
            .collect();
        self.reveals.opened = self.reveals.values.len();
        pending
    }

    /// Fills in the values opened by the evaluator and marks them as opened.
    pub(crate) fn apply_openings(&mut self, openings: Vec<u64>) -> Result<(), Error> {
        let expected = self.reveals.values.len() - self.reveals.opened;
        if openings.len() != expected {
            return Err(ProtocolViolation::OpeningCountMismatch {
                expected,
                actual: openings.len(),
            }
            .into());
        }
        for (slot, value) in self.reveals.values[self.reveals.opened..]
            .iter_mut()
            .zip(openings)
        {
            *slot = Some(value);
        }
        self.reveals.opened = self.reveals.values.len();
        Ok(())
    }

    /// The number of revealed values that have not been opened to both parties yet.
    pub fn pending_openings(&self) -> usize {
        self.reveals.values.len() - self.reveals.opened
    }

    /// All opened values, in program order.
    pub fn revealed_values(&self) -> Vec<u64> {
        self.reveals.values[..self.reveals.opened]
            .iter()
            .flatten()
            .copied()
            .collect()
    }

    fn read(&self, reg: Reg) -> Result<Label, InterpreterError> {
        self.secret
            .get(reg)
            .copied()
            .flatten()
            .ok_or(InterpreterError::UninitializedRegister(reg))
    }

    fn write(&mut self, reg: Reg, label: Label) {
        self.secret[reg] = Some(label);
    }

    /// Reads a clear register whose value decides an address or a jump.
    ///
    /// Returns `None` and taints the processor if the value is not yet opened to both parties.
    fn read_clear(&mut self, reg: ClearReg) -> Result<Option<u64>, InterpreterError> {
        match self.clear[reg] {
            ClearCell::Unset => Err(InterpreterError::UninitializedClear(reg)),
            ClearCell::Public(value) => Ok(Some(value)),
            ClearCell::Revealed(i) if i < self.reveals.opened => Ok(self.reveals.values[i]),
            ClearCell::Revealed(_) => {
                self.taint.taint();
                Ok(None)
            }
        }
    }

    fn step(
        &mut self,
        instr: &Instruction,
        memory: &mut Memory,
        backend: &mut impl Backend,
    ) -> Result<(), Error> {
        match instr {
            Instruction::InputGarbler(dst) => {
                let label = backend.input_garbler()?;
                self.write(*dst, label);
            }
            Instruction::InputEvaluator(dst) => {
                let label = backend.input_evaluator()?;
                self.write(*dst, label);
            }
            Instruction::Xor { dst, lhs, rhs } => {
                let label = backend.xor(self.read(*lhs)?, self.read(*rhs)?);
                self.write(*dst, label);
            }
            Instruction::And { dst, lhs, rhs } => {
                let label = backend.and(self.read(*lhs)?, self.read(*rhs)?)?;
                self.write(*dst, label);
            }
            Instruction::Not { dst, src } => {
                let label = backend.not(self.read(*src)?);
                self.write(*dst, label);
            }
            Instruction::Reveal { dst, src } => {
                let wires = src
                    .iter()
                    .map(|reg| self.read(*reg))
                    .collect::<Result<Vec<_>, _>>()?;
                let value = backend.reveal(&wires)?;
                self.clear[*dst] = ClearCell::Revealed(self.reveals.values.len());
                self.reveals.values.push(value);
            }
            Instruction::PrivateOutput(src) => {
                let wires = src
                    .iter()
                    .map(|reg| self.read(*reg))
                    .collect::<Result<Vec<_>, _>>()?;
                backend.private_output(&wires)?;
            }
            Instruction::SetClear { dst, value } => {
                self.clear[*dst] = ClearCell::Public(*value);
            }
            Instruction::StoreDyn { src, base, offset } => {
                let label = self.read(*src)?;
                if let Some(offset) = self.read_clear(*offset)? {
                    *memory.cell(*base, offset)? = Some(label);
                }
            }
            Instruction::LoadDyn { dst, base, offset } => {
                if let Some(offset) = self.read_clear(*offset)? {
                    let address = memory.address(*base, offset)?;
                    let label = memory.cells[address]
                        .ok_or(InterpreterError::UninitializedMemory(address))?;
                    self.write(*dst, label);
                }
            }
            Instruction::JumpIfZero { cond, target } => {
                if let Some(cond) = self.read_clear(*cond)? {
                    if cond == 0 {
                        self.pc = *target;
                    }
                }
            }
            Instruction::Jump(target) => self.pc = *target,
        }
        Ok(())
    }
}

/// The label memory of one party, addressed by dynamic offsets.
#[derive(Debug, Clone)]
pub struct Memory {
    cells: Vec<Option<Label>>,
}

impl Memory {
    fn address(&self, base: usize, offset: u64) -> Result<usize, InterpreterError> {
        let out_of_bounds = || InterpreterError::MemoryOutOfBounds {
            address: (base as u64).saturating_add(offset),
            size: self.cells.len(),
        };
        let address = usize::try_from(offset)
            .ok()
            .and_then(|offset| base.checked_add(offset))
            .ok_or_else(out_of_bounds)?;
        if address < self.cells.len() {
            Ok(address)
        } else {
            Err(out_of_bounds())
        }
    }

    fn cell(&mut self, base: usize, offset: u64) -> Result<&mut Option<Label>, InterpreterError> {
        let address = self.address(base, offset)?;
        Ok(&mut self.cells[address])
    }

    /// Returns the label stored at `address`, if any.
    pub fn get(&self, address: usize) -> Option<Label> {
        self.cells.get(address).copied().flatten()
    }
}
