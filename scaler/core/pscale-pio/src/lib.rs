#![no_std]

use log::error;

pub mod fallback;
pub mod instruction;
pub mod program;
pub mod state_machine;

pub use fallback::CpuLookup;
pub use program::{END_OF_SPRITE, FINISHED_IRQ, PALETTE_LOOKUP, PALETTE_LOOKUP_PROGRAM};
pub use state_machine::{LoadError, ShiftConfig, StateMachine};

/// Anything that turns packed pixel words into palette addresses through a
/// pair of FIFOs.
///
/// Contract: the first word after a restart (or after a finished sprite) is
/// the palette base. Every following word carries four 8-bit indices, least
/// significant first, and yields four addresses `base + 2 * index` in order.
/// [`END_OF_SPRITE`] sets the finished flag and rearms for the next base.
pub trait LookupUnit {
    /// TX FIFO has room.
    fn tx_ready(&self) -> bool;
    fn put(&mut self, word: u32) -> bool;
    /// RX FIFO holds at least one address.
    fn rx_ready(&self) -> bool;
    fn get(&mut self) -> Option<u32>;
    /// Advance by one clock.
    fn step(&mut self);
    fn finished(&self) -> bool;
    fn clear_finished(&mut self);
    /// Drop FIFO contents and in-flight work. The program stays loaded.
    fn restart(&mut self);
}

/// A state machine running [`PALETTE_LOOKUP`].
#[derive(Debug)]
pub struct Microsequencer {
    sm: StateMachine,
}

impl Microsequencer {
    pub fn new() -> Self {
        let mut sm = StateMachine::new(ShiftConfig::default());
        if let Err(e) = sm.load_instructions(&PALETTE_LOOKUP_PROGRAM) {
            error!(target: "pio", "failed to load palette lookup: {}", e);
        }
        Self { sm }
    }

    /// Runs a different encoded program in place of the palette lookup.
    /// It must honour the [`LookupUnit`] contract.
    pub fn with_program(words: &[u16]) -> Result<Self, LoadError> {
        let mut sm = StateMachine::new(ShiftConfig::default());
        sm.load(words)?;
        Ok(Self { sm })
    }

    pub fn state_machine(&self) -> &StateMachine {
        &self.sm
    }
}

impl Default for Microsequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl LookupUnit for Microsequencer {
    fn tx_ready(&self) -> bool {
        !self.sm.tx_full()
    }

    fn put(&mut self, word: u32) -> bool {
        self.sm.put(word)
    }

    fn rx_ready(&self) -> bool {
        !self.sm.rx_empty()
    }

    fn get(&mut self) -> Option<u32> {
        self.sm.get()
    }

    fn step(&mut self) {
        self.sm.step();
    }

    fn finished(&self) -> bool {
        self.sm.irq_flag(FINISHED_IRQ)
    }

    fn clear_finished(&mut self) {
        self.sm.clear_irq(FINISHED_IRQ);
    }

    fn restart(&mut self) {
        self.sm.clear_fifos();
        self.sm.restart();
        self.sm.clear_irq(FINISHED_IRQ);
    }
}
