use heapless::{Deque, Vec};
use log::{trace, warn};

use crate::instruction::{
    DecodeError, InSource, Instruction, JmpCondition, MovDestination, MovOp, MovSource,
    OutDestination, SetDestination,
};

pub const FIFO_DEPTH: usize = 4;
pub const INSTRUCTION_MEMORY: usize = 32;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("program of {len} instructions does not fit in instruction memory")]
    TooLong { len: usize },
    #[error("program is empty")]
    Empty,
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Shift register configuration, mirrors SHIFTCTRL.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ShiftConfig {
    pub in_shift_right: bool,
    pub out_shift_right: bool,
    pub push_threshold: u8,
    pub pull_threshold: u8,
}

impl Default for ShiftConfig {
    fn default() -> Self {
        Self {
            in_shift_right: true,
            out_shift_right: true,
            push_threshold: 32,
            pull_threshold: 32,
        }
    }
}

/// One microsequencer state machine with its private instruction memory.
///
/// Pins, side-set and delay cycles are not modelled. `STATUS` reads as all
/// ones while the TX FIFO is empty.
#[derive(Debug)]
pub struct StateMachine {
    program: Vec<Instruction, INSTRUCTION_MEMORY>,
    shift: ShiftConfig,

    pc: u8,
    x: u32,
    y: u32,
    isr: u32,
    osr: u32,
    isr_count: u8,
    osr_count: u8,

    tx: Deque<u32, FIFO_DEPTH>,
    rx: Deque<u32, FIFO_DEPTH>,

    irq_flags: u8,
    irq_wait: Option<u8>,
    stalled: bool,

    pub cycles: u64,
    pub stall_cycles: u64,
}

fn low_bits(count: u8) -> u32 {
    if count >= 32 { u32::MAX } else { (1u32 << count) - 1 }
}

impl StateMachine {
    pub fn new(shift: ShiftConfig) -> Self {
        Self {
            program: Vec::new(),
            shift,
            pc: 0,
            x: 0,
            y: 0,
            isr: 0,
            osr: 0,
            isr_count: 0,
            // an empty OSR counts as fully shifted out
            osr_count: 32,
            tx: Deque::new(),
            rx: Deque::new(),
            irq_flags: 0,
            irq_wait: None,
            stalled: false,
            cycles: 0,
            stall_cycles: 0,
        }
    }

    /// Loads a program from already decoded instructions.
    pub fn load_instructions(&mut self, program: &[Instruction]) -> Result<(), LoadError> {
        if program.is_empty() {
            return Err(LoadError::Empty);
        }
        self.program.clear();
        self.program
            .extend_from_slice(program)
            .map_err(|_| LoadError::TooLong { len: program.len() })?;
        self.restart();
        Ok(())
    }

    /// Decodes and loads an encoded program.
    pub fn load(&mut self, words: &[u16]) -> Result<(), LoadError> {
        if words.len() > INSTRUCTION_MEMORY {
            return Err(LoadError::TooLong { len: words.len() });
        }
        let mut decoded: Vec<Instruction, INSTRUCTION_MEMORY> = Vec::new();
        for &word in words {
            // length checked above
            let _ = decoded.push(Instruction::decode(word)?);
        }
        self.load_instructions(&decoded)
    }

    /// Jumps back to the first instruction and clears the scratch registers.
    /// FIFO contents and IRQ flags survive, like SM_RESTART.
    pub fn restart(&mut self) {
        self.pc = 0;
        self.x = 0;
        self.y = 0;
        self.isr = 0;
        self.osr = 0;
        self.isr_count = 0;
        self.osr_count = 32;
        self.irq_wait = None;
        self.stalled = false;
    }

    pub fn clear_fifos(&mut self) {
        self.tx.clear();
        self.rx.clear();
    }

    pub fn put(&mut self, word: u32) -> bool {
        self.tx.push_back(word).is_ok()
    }

    pub fn get(&mut self) -> Option<u32> {
        self.rx.pop_front()
    }

    pub fn tx_full(&self) -> bool {
        self.tx.is_full()
    }

    pub fn tx_level(&self) -> usize {
        self.tx.len()
    }

    pub fn rx_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn rx_level(&self) -> usize {
        self.rx.len()
    }

    pub fn irq_flag(&self, index: u8) -> bool {
        self.irq_flags & (1 << (index & 7)) != 0
    }

    pub fn clear_irq(&mut self, index: u8) {
        self.irq_flags &= !(1 << (index & 7));
    }

    pub fn pc(&self) -> u8 {
        self.pc
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    fn status(&self) -> u32 {
        if self.tx.is_empty() { u32::MAX } else { 0 }
    }

    fn shift_in(&mut self, data: u32, count: u8) {
        let data = data & low_bits(count);
        self.isr = if count >= 32 {
            data
        } else if self.shift.in_shift_right {
            (self.isr >> count) | (data << (32 - count))
        } else {
            (self.isr << count) | data
        };
        self.isr_count = self.isr_count.saturating_add(count).min(32);
    }

    fn shift_out(&mut self, count: u8) -> u32 {
        let data = if count >= 32 {
            let data = self.osr;
            self.osr = 0;
            data
        } else if self.shift.out_shift_right {
            let data = self.osr & low_bits(count);
            self.osr >>= count;
            data
        } else {
            let data = self.osr >> (32 - count);
            self.osr <<= count;
            data
        };
        self.osr_count = self.osr_count.saturating_add(count).min(32);
        data
    }

    /// Executes one instruction. A stalled instruction retries next cycle.
    pub fn step(&mut self) {
        if self.program.is_empty() {
            return;
        }
        self.cycles += 1;

        if let Some(index) = self.irq_wait {
            if self.irq_flag(index) {
                self.stall_cycles += 1;
                return;
            }
            self.irq_wait = None;
            self.stalled = false;
            self.pc = self.wrap(self.pc);
            return;
        }

        let Some(&instruction) = self.program.get(self.pc as usize) else {
            warn!(target: "pio", "pc {} outside loaded program, wrapping", self.pc);
            self.pc = 0;
            return;
        };

        let mut next = Some(self.wrap(self.pc));

        match instruction {
            Instruction::Jmp { condition, address } => {
                let taken = match condition {
                    JmpCondition::Always => true,
                    JmpCondition::XZero => self.x == 0,
                    JmpCondition::XPostDecrement => {
                        let taken = self.x != 0;
                        self.x = self.x.wrapping_sub(1);
                        taken
                    }
                    JmpCondition::YZero => self.y == 0,
                    JmpCondition::YPostDecrement => {
                        let taken = self.y != 0;
                        self.y = self.y.wrapping_sub(1);
                        taken
                    }
                    JmpCondition::XNotEqualY => self.x != self.y,
                    JmpCondition::Pin => false,
                    JmpCondition::OsrNotEmpty => self.osr_count < self.shift.pull_threshold,
                };
                if taken {
                    next = Some(address);
                }
            }
            Instruction::In { source, bit_count } => {
                let data = match source {
                    InSource::Pins | InSource::Null => 0,
                    InSource::X => self.x,
                    InSource::Y => self.y,
                    InSource::Isr => self.isr,
                    InSource::Osr => self.osr,
                };
                self.shift_in(data, bit_count);
            }
            Instruction::Out { destination, bit_count } => {
                let data = self.shift_out(bit_count);
                match destination {
                    OutDestination::X => self.x = data,
                    OutDestination::Y => self.y = data,
                    OutDestination::Isr => {
                        self.isr = data;
                        self.isr_count = bit_count;
                    }
                    OutDestination::Pc => next = Some((data & 0x1f) as u8),
                    OutDestination::Null | OutDestination::Pins | OutDestination::PinDirs => {}
                    OutDestination::Exec => {
                        warn!(target: "pio", "out exec is not supported, dropping {:#x}", data);
                    }
                }
            }
            Instruction::Push { if_full, block } => {
                if !if_full || self.isr_count >= self.shift.push_threshold {
                    if self.rx.is_full() {
                        if block {
                            next = None;
                        } else {
                            trace!(target: "pio", "rx full, dropping {:#010x}", self.isr);
                            self.isr = 0;
                            self.isr_count = 0;
                        }
                    } else {
                        let _ = self.rx.push_back(self.isr);
                        self.isr = 0;
                        self.isr_count = 0;
                    }
                }
            }
            Instruction::Pull { if_empty, block } => {
                if !if_empty || self.osr_count >= self.shift.pull_threshold {
                    match self.tx.pop_front() {
                        Some(word) => {
                            self.osr = word;
                            self.osr_count = 0;
                        }
                        None if block => next = None,
                        None => {
                            self.osr = self.x;
                            self.osr_count = 0;
                        }
                    }
                }
            }
            Instruction::Mov { destination, op, source } => {
                let value = match source {
                    MovSource::Pins | MovSource::Null => 0,
                    MovSource::X => self.x,
                    MovSource::Y => self.y,
                    MovSource::Status => self.status(),
                    MovSource::Isr => self.isr,
                    MovSource::Osr => self.osr,
                };
                let value = match op {
                    MovOp::None => value,
                    MovOp::Invert => !value,
                    MovOp::BitReverse => value.reverse_bits(),
                };
                match destination {
                    MovDestination::X => self.x = value,
                    MovDestination::Y => self.y = value,
                    MovDestination::Isr => {
                        self.isr = value;
                        self.isr_count = 0;
                    }
                    MovDestination::Osr => {
                        self.osr = value;
                        self.osr_count = 0;
                    }
                    MovDestination::Pc => next = Some((value & 0x1f) as u8),
                    MovDestination::Pins => {}
                    MovDestination::Exec => {
                        warn!(target: "pio", "mov exec is not supported, dropping {:#x}", value);
                    }
                }
            }
            Instruction::Irq { clear, wait, index } => {
                let index = index & 7;
                if clear {
                    self.clear_irq(index);
                } else {
                    self.irq_flags |= 1 << index;
                    trace!(target: "pio", "irq {} raised at pc {}", index, self.pc);
                    if wait {
                        self.irq_wait = Some(index);
                        self.stalled = true;
                        return;
                    }
                }
            }
            Instruction::Set { destination, data } => match destination {
                SetDestination::X => self.x = data as u32,
                SetDestination::Y => self.y = data as u32,
                SetDestination::Pins | SetDestination::PinDirs => {}
            },
        }

        match next {
            Some(pc) => {
                self.pc = pc;
                self.stalled = false;
            }
            None => {
                self.stalled = true;
                self.stall_cycles += 1;
            }
        }
    }

    fn wrap(&self, pc: u8) -> u8 {
        if pc as usize + 1 >= self.program.len() { 0 } else { pc + 1 }
    }
}
