use heapless::Deque;
use log::trace;

use crate::program::{palette_address, END_OF_SPRITE};
use crate::state_machine::FIFO_DEPTH;
use crate::LookupUnit;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    AwaitBase,
    AwaitWord { base: u32 },
    Emitting { base: u32, word: u32, remaining: u8 },
}

/// Palette lookup on the CPU for targets without a microsequencer.
///
/// Same FIFOs, same input stream and same address stream as the program,
/// one resolved index per `step`.
#[derive(Debug)]
pub struct CpuLookup {
    tx: Deque<u32, FIFO_DEPTH>,
    rx: Deque<u32, FIFO_DEPTH>,
    state: State,
    finished: bool,
}

impl CpuLookup {
    pub fn new() -> Self {
        Self {
            tx: Deque::new(),
            rx: Deque::new(),
            state: State::AwaitBase,
            finished: false,
        }
    }
}

impl Default for CpuLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl LookupUnit for CpuLookup {
    fn tx_ready(&self) -> bool {
        !self.tx.is_full()
    }

    fn put(&mut self, word: u32) -> bool {
        self.tx.push_back(word).is_ok()
    }

    fn rx_ready(&self) -> bool {
        !self.rx.is_empty()
    }

    fn get(&mut self) -> Option<u32> {
        self.rx.pop_front()
    }

    fn step(&mut self) {
        self.state = match self.state {
            State::AwaitBase => match self.tx.pop_front() {
                Some(base) => State::AwaitWord { base },
                None => State::AwaitBase,
            },
            State::AwaitWord { base } => match self.tx.pop_front() {
                Some(END_OF_SPRITE) => {
                    trace!(target: "pio", "cpu lookup reached end of sprite");
                    self.finished = true;
                    State::AwaitBase
                }
                Some(word) => State::Emitting { base, word, remaining: 4 },
                None => State::AwaitWord { base },
            },
            State::Emitting { base, word, remaining } => {
                if self.rx.is_full() {
                    State::Emitting { base, word, remaining }
                } else {
                    let _ = self.rx.push_back(palette_address(base, word as u8));
                    if remaining > 1 {
                        State::Emitting { base, word: word >> 8, remaining: remaining - 1 }
                    } else {
                        State::AwaitWord { base }
                    }
                }
            }
        };
    }

    fn finished(&self) -> bool {
        self.finished
    }

    fn clear_finished(&mut self) {
        self.finished = false;
    }

    fn restart(&mut self) {
        self.tx.clear();
        self.rx.clear();
        self.state = State::AwaitBase;
        self.finished = false;
    }
}
