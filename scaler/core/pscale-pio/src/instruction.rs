//! 16-bit microsequencer instruction words.
//!
//! The encoding follows the usual PIO layout: opcode in bits 15:13,
//! delay/side-set in 12:8 (not modelled, always encoded as zero) and the
//! operands in 7:0. `WAIT` is not used by any program here and does not
//! decode.

use bit_field::BitField;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JmpCondition {
    Always = 0b000,
    /// `!x`: jump if X is zero.
    XZero = 0b001,
    /// `x--`: jump if X is non-zero, decrement X either way.
    XPostDecrement = 0b010,
    /// `!y`
    YZero = 0b011,
    /// `y--`
    YPostDecrement = 0b100,
    /// `x!=y`
    XNotEqualY = 0b101,
    Pin = 0b110,
    /// `!osre`: jump while the output shift register still holds bits.
    OsrNotEmpty = 0b111,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InSource {
    Pins = 0b000,
    X = 0b001,
    Y = 0b010,
    Null = 0b011,
    Isr = 0b110,
    Osr = 0b111,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OutDestination {
    Pins = 0b000,
    X = 0b001,
    Y = 0b010,
    Null = 0b011,
    PinDirs = 0b100,
    Pc = 0b101,
    Isr = 0b110,
    Exec = 0b111,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MovDestination {
    Pins = 0b000,
    X = 0b001,
    Y = 0b010,
    Exec = 0b100,
    Pc = 0b101,
    Isr = 0b110,
    Osr = 0b111,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MovOp {
    None = 0b00,
    Invert = 0b01,
    BitReverse = 0b10,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MovSource {
    Pins = 0b000,
    X = 0b001,
    Y = 0b010,
    Null = 0b011,
    Status = 0b101,
    Isr = 0b110,
    Osr = 0b111,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SetDestination {
    Pins = 0b000,
    X = 0b001,
    Y = 0b010,
    PinDirs = 0b100,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Instruction {
    Jmp { condition: JmpCondition, address: u8 },
    /// `bit_count` of 32 is encoded as 0.
    In { source: InSource, bit_count: u8 },
    Out { destination: OutDestination, bit_count: u8 },
    Push { if_full: bool, block: bool },
    Pull { if_empty: bool, block: bool },
    Mov { destination: MovDestination, op: MovOp, source: MovSource },
    Irq { clear: bool, wait: bool, index: u8 },
    Set { destination: SetDestination, data: u8 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported opcode {opcode:#05b} in {word:#06x}")]
    UnsupportedOpcode { word: u16, opcode: u16 },
    #[error("invalid operand field {field:#05b} in {word:#06x}")]
    InvalidOperand { word: u16, field: u16 },
}

const OP_JMP: u16 = 0b000;
const OP_IN: u16 = 0b010;
const OP_OUT: u16 = 0b011;
const OP_PUSH_PULL: u16 = 0b100;
const OP_MOV: u16 = 0b101;
const OP_IRQ: u16 = 0b110;
const OP_SET: u16 = 0b111;

const fn count_field(bit_count: u8) -> u16 {
    (bit_count & 0x1f) as u16
}

const fn count_from_field(field: u16) -> u8 {
    if field == 0 { 32 } else { field as u8 }
}

impl Instruction {
    pub const fn encode(self) -> u16 {
        match self {
            Instruction::Jmp { condition, address } => {
                (OP_JMP << 13) | ((condition as u16) << 5) | (address as u16 & 0x1f)
            }
            Instruction::In { source, bit_count } => {
                (OP_IN << 13) | ((source as u16) << 5) | count_field(bit_count)
            }
            Instruction::Out { destination, bit_count } => {
                (OP_OUT << 13) | ((destination as u16) << 5) | count_field(bit_count)
            }
            Instruction::Push { if_full, block } => {
                (OP_PUSH_PULL << 13) | ((if_full as u16) << 6) | ((block as u16) << 5)
            }
            Instruction::Pull { if_empty, block } => {
                (OP_PUSH_PULL << 13) | (1 << 7) | ((if_empty as u16) << 6) | ((block as u16) << 5)
            }
            Instruction::Mov { destination, op, source } => {
                (OP_MOV << 13) | ((destination as u16) << 5) | ((op as u16) << 3) | source as u16
            }
            Instruction::Irq { clear, wait, index } => {
                (OP_IRQ << 13) | ((clear as u16) << 6) | ((wait as u16) << 5) | (index as u16 & 0x1f)
            }
            Instruction::Set { destination, data } => {
                (OP_SET << 13) | ((destination as u16) << 5) | (data as u16 & 0x1f)
            }
        }
    }

    pub fn decode(word: u16) -> Result<Self, DecodeError> {
        let opcode = word.get_bits(13..16);
        let target = word.get_bits(5..8);
        let low = word.get_bits(0..5);
        let invalid = |field| DecodeError::InvalidOperand { word, field };

        let instruction = match opcode {
            OP_JMP => Instruction::Jmp {
                condition: match target {
                    0b000 => JmpCondition::Always,
                    0b001 => JmpCondition::XZero,
                    0b010 => JmpCondition::XPostDecrement,
                    0b011 => JmpCondition::YZero,
                    0b100 => JmpCondition::YPostDecrement,
                    0b101 => JmpCondition::XNotEqualY,
                    0b110 => JmpCondition::Pin,
                    _ => JmpCondition::OsrNotEmpty,
                },
                address: low as u8,
            },
            OP_IN => Instruction::In {
                source: match target {
                    0b000 => InSource::Pins,
                    0b001 => InSource::X,
                    0b010 => InSource::Y,
                    0b011 => InSource::Null,
                    0b110 => InSource::Isr,
                    0b111 => InSource::Osr,
                    other => return Err(invalid(other)),
                },
                bit_count: count_from_field(low),
            },
            OP_OUT => Instruction::Out {
                destination: match target {
                    0b000 => OutDestination::Pins,
                    0b001 => OutDestination::X,
                    0b010 => OutDestination::Y,
                    0b011 => OutDestination::Null,
                    0b100 => OutDestination::PinDirs,
                    0b101 => OutDestination::Pc,
                    0b110 => OutDestination::Isr,
                    _ => OutDestination::Exec,
                },
                bit_count: count_from_field(low),
            },
            OP_PUSH_PULL => {
                let flag = word.get_bit(6);
                let block = word.get_bit(5);
                if word.get_bit(7) {
                    Instruction::Pull { if_empty: flag, block }
                } else {
                    Instruction::Push { if_full: flag, block }
                }
            }
            OP_MOV => Instruction::Mov {
                destination: match target {
                    0b000 => MovDestination::Pins,
                    0b001 => MovDestination::X,
                    0b010 => MovDestination::Y,
                    0b100 => MovDestination::Exec,
                    0b101 => MovDestination::Pc,
                    0b110 => MovDestination::Isr,
                    0b111 => MovDestination::Osr,
                    other => return Err(invalid(other)),
                },
                op: match word.get_bits(3..5) {
                    0b00 => MovOp::None,
                    0b01 => MovOp::Invert,
                    0b10 => MovOp::BitReverse,
                    other => return Err(invalid(other)),
                },
                source: match word.get_bits(0..3) {
                    0b000 => MovSource::Pins,
                    0b001 => MovSource::X,
                    0b010 => MovSource::Y,
                    0b011 => MovSource::Null,
                    0b101 => MovSource::Status,
                    0b110 => MovSource::Isr,
                    0b111 => MovSource::Osr,
                    other => return Err(invalid(other)),
                },
            },
            OP_IRQ => Instruction::Irq {
                clear: word.get_bit(6),
                wait: word.get_bit(5),
                index: low as u8,
            },
            OP_SET => Instruction::Set {
                destination: match target {
                    0b000 => SetDestination::Pins,
                    0b001 => SetDestination::X,
                    0b010 => SetDestination::Y,
                    0b100 => SetDestination::PinDirs,
                    other => return Err(invalid(other)),
                },
                data: low as u8,
            },
            _ => return Err(DecodeError::UnsupportedOpcode { word, opcode }),
        };

        Ok(instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_encodings() {
        // pull block
        assert_eq!(Instruction::Pull { if_empty: false, block: true }.encode(), 0x80a0);
        // push block
        assert_eq!(Instruction::Push { if_full: false, block: true }.encode(), 0x8020);
        // mov y, ~osr
        let mov = Instruction::Mov { destination: MovDestination::Y, op: MovOp::Invert, source: MovSource::Osr };
        assert_eq!(mov.encode(), 0xa04f);
        // out x, 8
        let out = Instruction::Out { destination: OutDestination::X, bit_count: 8 };
        assert_eq!(out.encode(), 0x6028);
        // jmp !osre 5
        let jmp = Instruction::Jmp { condition: JmpCondition::OsrNotEmpty, address: 5 };
        assert_eq!(jmp.encode(), 0x00e5);
        // irq nowait 0
        assert_eq!(Instruction::Irq { clear: false, wait: false, index: 0 }.encode(), 0xc000);
    }

    #[test]
    fn full_width_counts_use_zero_field() {
        let out = Instruction::Out { destination: OutDestination::Null, bit_count: 32 };
        assert_eq!(out.encode() & 0x1f, 0);
        assert_eq!(Instruction::decode(out.encode()), Ok(out));
    }

    #[test]
    fn wait_is_rejected() {
        assert_eq!(
            Instruction::decode(0x2020),
            Err(DecodeError::UnsupportedOpcode { word: 0x2020, opcode: 0b001 })
        );
    }

    #[test]
    fn reserved_mov_operands_are_rejected() {
        // mov with op field 0b11
        assert!(matches!(Instruction::decode(0xa018), Err(DecodeError::InvalidOperand { .. })));
    }
}
