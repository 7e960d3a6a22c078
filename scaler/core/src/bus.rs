//! System bus seen by the DMA channels.
//!
//! Memory map:
//!
//! | range                   | contents                          |
//! |-------------------------|-----------------------------------|
//! | `0x1000_0000`           | sprite pixel indices (read only)  |
//! | `0x1100_0000`           | sprite palette, RGB565 (read only)|
//! | `0x2000_0000`           | scale pattern table (read only)   |
//! | `0x2001_0000`           | address list (read only)          |
//! | `0x2002_0000`           | scratch pool                      |
//! | `0x5000_0000`           | DMA channel registers, row port   |
//! | `0x5020_0000`           | lookup unit FIFOs                 |
//!
//! Unmapped reads return open bus (all ones).

use bytemuck::cast_slice;
use log::warn;
use pscale_pio::LookupUnit;

use crate::chain::{AddressPair, SENTINEL_ADDRESS};
use crate::dma::DataSize;
use crate::pattern::{ScalePattern, PATTERNS};

pub const SPRITE_BASE: u32 = 0x1000_0000;
pub const PALETTE_BASE: u32 = 0x1100_0000;
pub const PATTERN_BASE: u32 = 0x2000_0000;
pub const ADDRESS_LIST_BASE: u32 = 0x2001_0000;
pub const SCRATCH_BASE: u32 = 0x2002_0000;
pub const DMA_BASE: u32 = 0x5000_0000;
pub const DMA_END: u32 = DMA_BASE + 0x1000;
pub const PIO_BASE: u32 = 0x5020_0000;

pub const PIO_TXF: u32 = PIO_BASE + 0x10;
pub const PIO_RXF: u32 = PIO_BASE + 0x20;

pub const OPEN_BUS: u32 = u32::MAX;

/// Bus address of the pattern for `eighths`.
pub const fn pattern_address(eighths: u32) -> u32 {
    PATTERN_BASE + (eighths - 1) * core::mem::size_of::<ScalePattern>() as u32
}

/// Passive memory regions for one draw.
#[derive(Debug)]
pub struct Memory<'a> {
    pub sprite: &'a [u8],
    pub palette: &'a [u16],
    pub addresses: &'a [AddressPair],
    pub scratch: &'a mut [u16],
}

pub struct SystemBus<'m, 'a> {
    pub memory: &'m mut Memory<'a>,
    pub lookup: &'m mut dyn LookupUnit,
}

fn offset_in(address: u32, base: u32, len_bytes: usize) -> Option<usize> {
    let offset = address.wrapping_sub(base) as usize;
    (offset < len_bytes).then_some(offset)
}

fn read_bytes(bytes: &[u8], offset: usize, size: DataSize) -> Option<u32> {
    let width = size.bytes() as usize;
    let chunk = bytes.get(offset..offset + width)?;
    Some(chunk.iter().rev().fold(0u32, |acc, &b| (acc << 8) | b as u32))
}

impl<'m, 'a> SystemBus<'m, 'a> {
    pub fn read(&mut self, address: u32, size: DataSize) -> u32 {
        let address = address & !(size.bytes() - 1);
        let memory = &*self.memory;

        let value = if let Some(offset) = offset_in(address, SPRITE_BASE, memory.sprite.len()) {
            read_bytes(memory.sprite, offset, size)
        } else if let Some(offset) = offset_in(address, PALETTE_BASE, memory.palette.len() * 2) {
            read_bytes(cast_slice(memory.palette), offset, size)
        } else if let Some(offset) = offset_in(address, PATTERN_BASE, core::mem::size_of_val(&PATTERNS)) {
            read_bytes(cast_slice(&PATTERNS[..]), offset, size)
        } else if let Some(offset) = offset_in(address, ADDRESS_LIST_BASE, memory.addresses.len() * 8) {
            read_bytes(cast_slice(memory.addresses), offset, size)
        } else if let Some(offset) = offset_in(address, SCRATCH_BASE, memory.scratch.len() * 2) {
            read_bytes(cast_slice(&memory.scratch[..]), offset, size)
        } else if address == PIO_RXF {
            self.lookup.get()
        } else {
            None
        };

        match value {
            Some(value) => value,
            // the end-of-work row reads through here on every draw
            None if address == SENTINEL_ADDRESS & !(size.bytes() - 1) => OPEN_BUS,
            None => {
                warn!(target: "dma", "open bus read at {:#010x}", address);
                OPEN_BUS
            }
        }
    }

    pub fn write(&mut self, address: u32, data: u32, size: DataSize) {
        let address = address & !(size.bytes() - 1);

        if let Some(offset) = offset_in(address, SCRATCH_BASE, self.memory.scratch.len() * 2) {
            let scratch: &mut [u8] = bytemuck::cast_slice_mut(&mut self.memory.scratch[..]);
            let width = size.bytes() as usize;
            if let Some(chunk) = scratch.get_mut(offset..offset + width) {
                chunk.copy_from_slice(&data.to_le_bytes()[..width]);
                return;
            }
        } else if address == PIO_TXF {
            if !self.lookup.put(data) {
                warn!(target: "dma", "lookup tx overflow, dropped {:#010x}", data);
            }
            return;
        }

        warn!(target: "dma", "write to unmapped {:#010x} ({:#x})", address, data);
    }

    pub fn tx_ready(&self) -> bool {
        self.lookup.tx_ready()
    }

    pub fn rx_ready(&self) -> bool {
        self.lookup.rx_ready()
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use pscale_pio::CpuLookup;

    use super::*;

    #[test]
    fn reads_are_little_endian() {
        let sprite = [0x11u8, 0x22, 0x33, 0x44, 0x55];
        let palette = [0xabcdu16, 0x1234];
        let mut scratch = vec![0u16; 4];
        let mut memory = Memory { sprite: &sprite, palette: &palette, addresses: &[], scratch: &mut scratch };
        let mut lookup = CpuLookup::new();
        let mut bus = SystemBus { memory: &mut memory, lookup: &mut lookup };

        assert_eq!(bus.read(SPRITE_BASE, DataSize::Word), 0x4433_2211);
        assert_eq!(bus.read(SPRITE_BASE + 4, DataSize::Byte), 0x55);
        assert_eq!(bus.read(PALETTE_BASE + 2, DataSize::HalfWord), 0x1234);
        assert_eq!(bus.read(pattern_address(12), DataSize::Word), 2);
        assert_eq!(bus.read(pattern_address(12) + 4, DataSize::Word), 1);
        assert_eq!(bus.read(0x3000_0000, DataSize::Word), OPEN_BUS);
        assert_eq!(bus.read(SENTINEL_ADDRESS, DataSize::Word), OPEN_BUS);
    }

    #[test]
    fn halfword_writes_land_in_scratch() {
        let mut scratch = vec![0u16; 4];
        {
            let mut memory = Memory { sprite: &[], palette: &[], addresses: &[], scratch: &mut scratch };
            let mut lookup = CpuLookup::new();
            let mut bus = SystemBus { memory: &mut memory, lookup: &mut lookup };
            bus.write(SCRATCH_BASE + 2, 0xbeef, DataSize::HalfWord);
            bus.write(SCRATCH_BASE + 4, 0x5555_7777, DataSize::Word);
            assert_eq!(bus.read(SCRATCH_BASE + 2, DataSize::HalfWord), 0xbeef);
        }
        assert_eq!(scratch, [0, 0xbeef, 0x7777, 0x5555]);
    }

    #[test]
    fn fifo_ports_reach_the_lookup_unit() {
        let mut memory = Memory { sprite: &[], palette: &[], addresses: &[], scratch: &mut [] };
        let mut lookup = CpuLookup::new();
        let mut bus = SystemBus { memory: &mut memory, lookup: &mut lookup };

        assert!(bus.tx_ready());
        assert!(!bus.rx_ready());
        bus.write(PIO_TXF, 0x1100_0000, DataSize::Word);
        bus.write(PIO_TXF, 0x0000_0001, DataSize::Word);
        for _ in 0..8 {
            bus.lookup.step();
        }
        assert!(bus.rx_ready());
        assert_eq!(bus.read(PIO_RXF, DataSize::Word), 0x1100_0002);
    }
}
