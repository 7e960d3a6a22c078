//! The five-channel pixel pipeline.
//!
//! ```text
//! loader ──row port──> reader ──TX──> lookup ──RX──> color lookup
//!   ^                                                    │
//!   └────────────────────── chain ───────────────────────┤
//!                                                        v
//!                      feeder <──chain── writer <── READ_ADDR_TRIG
//!                        └──── TRANS_COUNT ───^
//! ```
//!
//! The loader moves one address pair per row into the row port, which points
//! the reader at the source row and the writer at the scratch row. The
//! reader streams packed pixel words into the lookup unit; the color lookup
//! channel hands every resolved palette address to the writer, which repeats
//! that colour as many times as the feeder's current pattern slot says.

use heapless::Vec;
use log::debug;
use pscale_pio::END_OF_SPRITE;

use crate::bus::{ADDRESS_LIST_BASE, PIO_RXF, PIO_TXF};
use crate::dma::{
    channel_register, ChannelConfig, DataSize, Dma, Ring, RingSide, RowPort, TransferRequest,
    CTRL_TRIG, READ_ADDR, READ_ADDR_TRIG, ROW_PORT, TRANS_COUNT, WRITE_ADDR,
};

/// Output rows one draw can produce.
pub const ADDRESS_LIST_ROWS: usize = 512;

/// Both halves of the pair that ends the address list.
pub const SENTINEL_ADDRESS: u32 = END_OF_SPRITE;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct AddressPair {
    pub read: u32,
    pub write: u32,
}

impl AddressPair {
    pub const SENTINEL: AddressPair = AddressPair { read: SENTINEL_ADDRESS, write: SENTINEL_ADDRESS };
}

/// One pair per visible output row plus the sentinel.
pub type AddressList = Vec<AddressPair, { ADDRESS_LIST_ROWS + 1 }>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    ReadAddressLoader = 0,
    PixelReader = 1,
    ColorLookup = 2,
    PixelWriter = 3,
    HorizontalScaleFeeder = 4,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::ReadAddressLoader,
        Role::PixelReader,
        Role::ColorLookup,
        Role::PixelWriter,
        Role::HorizontalScaleFeeder,
    ];

    pub const fn channel(self) -> usize {
        self as usize
    }

    pub fn config(self) -> ChannelConfig {
        let base = ChannelConfig::default();
        match self {
            Role::ReadAddressLoader => ChannelConfig {
                ring: Some(Ring { side: RingSide::Write, size_bits: 3 }),
                chain_to: Some(Role::ColorLookup.channel()),
                ..base
            },
            Role::PixelReader => ChannelConfig {
                incr_write: false,
                treq: TransferRequest::PioTx,
                ..base
            },
            Role::ColorLookup => ChannelConfig {
                incr_read: false,
                incr_write: false,
                treq: TransferRequest::PioRx,
                chain_to: Some(Role::ReadAddressLoader.channel()),
                ..base
            },
            Role::PixelWriter => ChannelConfig {
                data_size: DataSize::HalfWord,
                incr_read: false,
                chain_to: Some(Role::HorizontalScaleFeeder.channel()),
                high_priority: true,
                ..base
            },
            Role::HorizontalScaleFeeder => ChannelConfig {
                incr_write: false,
                ring: Some(Ring { side: RingSide::Read, size_bits: 5 }),
                irq_quiet: false,
                ..base
            },
        }
    }
}

/// Per-draw parameters for the chain.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChainPlan {
    /// Source columns rendered per row, a multiple of eight.
    pub columns: u32,
    /// Bus address of the horizontal pattern, 32-byte aligned.
    pub pattern: u32,
}

impl ChainPlan {
    pub fn row_words(&self) -> u32 {
        self.columns / 4
    }
}

/// Programs every channel for one draw. Nothing starts until [`start`].
pub fn configure(dma: &mut Dma, plan: &ChainPlan) {
    use Role::*;

    dma.set_row_port(RowPort {
        reader: PixelReader.channel(),
        writer: PixelWriter.channel(),
        row_words: plan.row_words(),
        sentinel: SENTINEL_ADDRESS,
    });

    let setup = [
        (ReadAddressLoader, ADDRESS_LIST_BASE, ROW_PORT, 2),
        (PixelReader, 0, PIO_TXF, plan.row_words()),
        (ColorLookup, PIO_RXF, channel_register(PixelWriter.channel(), READ_ADDR_TRIG), plan.columns),
        (PixelWriter, 0, 0, 0),
        (HorizontalScaleFeeder, plan.pattern, channel_register(PixelWriter.channel(), TRANS_COUNT), 1),
    ];

    for (role, read, write, count) in setup {
        let channel = role.channel();
        dma.write_register(channel_register(channel, READ_ADDR), read);
        dma.write_register(channel_register(channel, WRITE_ADDR), write);
        dma.write_register(channel_register(channel, TRANS_COUNT), count);
        dma.channels[channel].ctrl = role.config().pack(channel);
        dma.clear_completed(channel);
    }

    debug!(target: "dma", "chain configured: {} columns, {} words per row, pattern at {:#010x}",
        plan.columns, plan.row_words(), plan.pattern);
}

/// Primes the writer with the first pattern slot and points the feeder at
/// the second, then starts the loader.
pub fn start(dma: &mut Dma, plan: &ChainPlan, first_slot: u32) {
    let writer = Role::PixelWriter.channel();
    let feeder = Role::HorizontalScaleFeeder.channel();
    dma.write_register(channel_register(writer, TRANS_COUNT), first_slot);
    dma.write_register(channel_register(feeder, READ_ADDR), plan.pattern + 4);

    let loader = Role::ReadAddressLoader.channel();
    let ctrl = dma.channels[loader].ctrl.bits();
    dma.write_register(channel_register(loader, CTRL_TRIG), ctrl);
}

/// The feeder has run since the start and is idle.
pub fn feeder_done(dma: &Dma) -> bool {
    let feeder = dma.channel(Role::HorizontalScaleFeeder.channel());
    feeder.completed && !feeder.busy()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dma::ChannelCtrl;

    #[test]
    fn roles_round_trip_through_ctrl() {
        for role in Role::ALL {
            let channel = role.channel();
            let ctrl = role.config().pack(channel);
            assert_eq!(ChannelConfig::unpack(ChannelCtrl::from_bits(ctrl.bits()), channel), Some(role.config()));
        }
    }

    #[test]
    fn address_pair_layout() {
        let pairs = [AddressPair { read: 1, write: 2 }, AddressPair::SENTINEL];
        let words: &[u32] = bytemuck::cast_slice(&pairs);
        assert_eq!(words, &[1, 2, u32::MAX, u32::MAX]);
    }

    #[test]
    fn priming_loads_the_first_slot() {
        let mut dma = Dma::default();
        let plan = ChainPlan { columns: 16, pattern: crate::bus::pattern_address(12) };
        configure(&mut dma, &plan);

        assert_eq!(dma.row_port.row_words, 4);
        assert_eq!(dma.channel(Role::PixelWriter.channel()).count_reload, 0);
        assert!(!dma.channel(Role::ReadAddressLoader.channel()).busy());

        start(&mut dma, &plan, 2);
        assert_eq!(dma.channel(Role::PixelWriter.channel()).count_reload, 2);
        assert_eq!(dma.channel(Role::HorizontalScaleFeeder.channel()).read_addr, plan.pattern + 4);
        assert!(dma.channel(Role::ReadAddressLoader.channel()).busy());
        assert!(!feeder_done(&dma));
    }
}
