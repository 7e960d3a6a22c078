//! Palette lookup program.
//!
//! Input on TX: the palette base address once, then packed pixel words (four
//! 8-bit indices, least significant first). Output on RX: one palette entry
//! address per index, `base + 2 * index`. The all-ones word ends the sprite:
//! the program raises [`FINISHED_IRQ`] and goes back to waiting for a base.
//!
//! There is no adder, so the base is kept inverted in Y and decremented twice
//! per index step: `~(~base - 2 * index) == base + 2 * index`. The base must
//! sit at least `2 * 255` bytes below the top of the address space.

use crate::instruction::{Instruction, JmpCondition, MovDestination, MovOp, MovSource, OutDestination};

pub const FINISHED_IRQ: u8 = 0;

/// Word that ends a sprite. Never a valid pixel word because palettes hold
/// at most 255 entries.
pub const END_OF_SPRITE: u32 = u32::MAX;

const NEXT_WORD: u8 = 2;
const PIXEL: u8 = 5;
const COUNT: u8 = 7;
const STEP: u8 = 9;
const EMIT: u8 = 11;
const FINISHED: u8 = 17;

const fn pull() -> Instruction {
    Instruction::Pull { if_empty: false, block: true }
}

const fn mov(destination: MovDestination, op: MovOp, source: MovSource) -> Instruction {
    Instruction::Mov { destination, op, source }
}

const fn jmp(condition: JmpCondition, address: u8) -> Instruction {
    Instruction::Jmp { condition, address }
}

pub const PALETTE_LOOKUP_PROGRAM: [Instruction; 19] = [
    // 0: y = ~base
    pull(),
    mov(MovDestination::Y, MovOp::Invert, MovSource::Osr),
    // 2: next packed word, x = ~word
    pull(),
    mov(MovDestination::X, MovOp::Invert, MovSource::Osr),
    jmp(JmpCondition::XZero, FINISHED),
    // 5: x = index, isr keeps ~base
    Instruction::Out { destination: OutDestination::X, bit_count: 8 },
    mov(MovDestination::Isr, MovOp::None, MovSource::Y),
    // 7
    jmp(JmpCondition::XPostDecrement, STEP),
    jmp(JmpCondition::Always, EMIT),
    // 9: two bytes per palette entry
    jmp(JmpCondition::YPostDecrement, STEP + 1),
    jmp(JmpCondition::YPostDecrement, COUNT),
    // 11: push ~y, restore y
    mov(MovDestination::X, MovOp::None, MovSource::Isr),
    mov(MovDestination::Isr, MovOp::Invert, MovSource::Y),
    Instruction::Push { if_full: false, block: true },
    mov(MovDestination::Y, MovOp::None, MovSource::X),
    jmp(JmpCondition::OsrNotEmpty, PIXEL),
    jmp(JmpCondition::Always, NEXT_WORD),
    // 17
    Instruction::Irq { clear: false, wait: false, index: FINISHED_IRQ },
    jmp(JmpCondition::Always, 0),
];

const fn encode_program<const N: usize>(program: [Instruction; N]) -> [u16; N] {
    let mut words = [0u16; N];
    let mut i = 0;
    while i < N {
        words[i] = program[i].encode();
        i += 1;
    }
    words
}

/// [`PALETTE_LOOKUP_PROGRAM`] as instruction memory words.
pub const PALETTE_LOOKUP: [u16; 19] = encode_program(PALETTE_LOOKUP_PROGRAM);

/// Address of palette entry `index`, as produced by the program.
pub const fn palette_address(base: u32, index: u8) -> u32 {
    base.wrapping_add(2 * index as u32)
}

#[cfg(test)]
mod tests {
    use heapless::Vec;

    use super::*;
    use crate::state_machine::{ShiftConfig, StateMachine};

    const BASE: u32 = 0x1100_0000;

    fn run(words: &[u32]) -> (StateMachine, Vec<u32, 64>) {
        let mut sm = StateMachine::new(ShiftConfig::default());
        sm.load(&PALETTE_LOOKUP).unwrap();

        let mut input = words.iter().copied().peekable();
        let mut output = Vec::new();
        for _ in 0..200_000 {
            if let Some(&word) = input.peek() {
                if sm.put(word) {
                    input.next();
                }
            }
            sm.step();
            while let Some(address) = sm.get() {
                output.push(address).unwrap();
            }
            if input.peek().is_none() && sm.irq_flag(FINISHED_IRQ) {
                break;
            }
        }
        (sm, output)
    }

    #[test]
    fn encoded_program_decodes_to_itself() {
        for (word, instruction) in PALETTE_LOOKUP.iter().zip(PALETTE_LOOKUP_PROGRAM.iter()) {
            assert_eq!(Instruction::decode(*word).as_ref(), Ok(instruction));
        }
    }

    #[test]
    fn resolves_four_indices_per_word() {
        let (sm, output) = run(&[BASE, 0x0302_0100, END_OF_SPRITE]);
        assert_eq!(output.as_slice(), &[BASE, BASE + 2, BASE + 4, BASE + 6]);
        assert!(sm.irq_flag(FINISHED_IRQ));
    }

    #[test]
    fn resolves_high_indices() {
        let (_, output) = run(&[BASE, 0x00fe_7f80, 0x0101_0101, END_OF_SPRITE]);
        let expected = [
            palette_address(BASE, 0x80),
            palette_address(BASE, 0x7f),
            palette_address(BASE, 0xfe),
            palette_address(BASE, 0x00),
            palette_address(BASE, 1),
            palette_address(BASE, 1),
            palette_address(BASE, 1),
            palette_address(BASE, 1),
        ];
        assert_eq!(output.as_slice(), &expected);
    }

    #[test]
    fn waits_for_a_new_base_after_the_sentinel() {
        let (mut sm, output) = run(&[BASE, END_OF_SPRITE]);
        assert!(output.is_empty());

        // let the final jmp execute
        sm.step();
        assert_eq!(sm.pc(), 0);

        sm.clear_irq(FINISHED_IRQ);
        let other = 0x2000_0000;
        sm.put(other);
        sm.put(0x0000_0005);
        let mut output: Vec<u32, 8> = Vec::new();
        for _ in 0..200 {
            sm.step();
            while let Some(address) = sm.get() {
                output.push(address).unwrap();
            }
        }
        assert_eq!(output.as_slice(), &[other + 10, other, other, other]);
        assert!(!sm.irq_flag(FINISHED_IRQ));
    }
}
