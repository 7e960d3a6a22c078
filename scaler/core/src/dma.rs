//! Transfer engine model.
//!
//! Each channel moves one unit per cycle when its transfer request is
//! ready, counts down `trans_count`, and on reaching zero raises its
//! completion flag and triggers its `chain_to` successor. Channels program
//! each other by writing into this register window.

use bitfield::bitfield;
use bit_field::BitField;
use log::{debug, trace, warn};

use crate::bus::{SystemBus, DMA_BASE, DMA_END};

pub const CHANNEL_COUNT: usize = 5;
pub const CHANNEL_STRIDE: u32 = 0x40;

pub const READ_ADDR: u32 = 0x00;
pub const WRITE_ADDR: u32 = 0x04;
pub const TRANS_COUNT: u32 = 0x08;
pub const CTRL_TRIG: u32 = 0x0c;
pub const READ_ADDR_TRIG: u32 = 0x10;
pub const TRANS_COUNT_TRIG: u32 = 0x14;

/// Two-word window: a source row address, then a destination row address
/// that starts the row.
pub const ROW_PORT: u32 = DMA_BASE + 0x400;
pub const ROW_READ: u32 = ROW_PORT;
pub const ROW_WRITE_TRIG: u32 = ROW_PORT + 0x04;

pub const fn channel_register(channel: usize, offset: u32) -> u32 {
    DMA_BASE + channel as u32 * CHANNEL_STRIDE + offset
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq, Default)]
    pub struct ChannelCtrl(u32);
    impl Debug;
    pub en, set_en: 0;
    pub high_priority, set_high_priority: 1;
    pub u8, data_size, set_data_size: 3, 2;
    pub incr_read, set_incr_read: 4;
    pub incr_write, set_incr_write: 5;
    pub u8, ring_size, set_ring_size: 9, 6;
    pub ring_sel, set_ring_sel: 10;
    pub u8, chain_to, set_chain_to: 14, 11;
    pub u8, treq_sel, set_treq_sel: 20, 15;
    pub irq_quiet, set_irq_quiet: 21;
    pub busy, set_busy: 24;
}

impl ChannelCtrl {
    pub fn from_bits(bits: u32) -> Self {
        ChannelCtrl(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataSize {
    Byte = 0,
    HalfWord = 1,
    Word = 2,
}

impl DataSize {
    pub const fn bytes(self) -> u32 {
        1 << self as u32
    }

    fn from_field(field: u8) -> Option<Self> {
        match field {
            0 => Some(DataSize::Byte),
            1 => Some(DataSize::HalfWord),
            2 => Some(DataSize::Word),
            _ => None,
        }
    }
}

/// Transfer request (pacing) source.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransferRequest {
    /// Lookup unit TX FIFO not full.
    PioTx = 0,
    /// Lookup unit RX FIFO not empty.
    PioRx = 4,
    /// Unpaced, one transfer every cycle.
    Permanent = 0x3f,
}

impl TransferRequest {
    fn from_field(field: u8) -> Option<Self> {
        match field {
            0 => Some(TransferRequest::PioTx),
            4 => Some(TransferRequest::PioRx),
            0x3f => Some(TransferRequest::Permanent),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RingSide {
    Read,
    Write,
}

/// Address wrapping on a `1 << size_bits` byte boundary.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Ring {
    pub side: RingSide,
    pub size_bits: u8,
}

/// Typed form of [`ChannelCtrl`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub enable: bool,
    pub high_priority: bool,
    pub data_size: DataSize,
    pub incr_read: bool,
    pub incr_write: bool,
    pub ring: Option<Ring>,
    pub chain_to: Option<usize>,
    pub treq: TransferRequest,
    pub irq_quiet: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            enable: true,
            high_priority: false,
            data_size: DataSize::Word,
            incr_read: true,
            incr_write: true,
            ring: None,
            chain_to: None,
            treq: TransferRequest::Permanent,
            irq_quiet: true,
        }
    }
}

impl ChannelConfig {
    /// Packs into a control word for `channel`. No successor is encoded as
    /// chaining to itself.
    pub fn pack(&self, channel: usize) -> ChannelCtrl {
        let mut ctrl = ChannelCtrl(0);
        ctrl.set_en(self.enable);
        ctrl.set_high_priority(self.high_priority);
        ctrl.set_data_size(self.data_size as u8);
        ctrl.set_incr_read(self.incr_read);
        ctrl.set_incr_write(self.incr_write);
        if let Some(ring) = self.ring {
            ctrl.set_ring_size(ring.size_bits);
            ctrl.set_ring_sel(ring.side == RingSide::Write);
        }
        ctrl.set_chain_to(self.chain_to.unwrap_or(channel) as u8);
        ctrl.set_treq_sel(self.treq as u8);
        ctrl.set_irq_quiet(self.irq_quiet);
        ctrl
    }

    pub fn unpack(ctrl: ChannelCtrl, channel: usize) -> Option<Self> {
        let chain_to = ctrl.chain_to() as usize;
        let ring = match ctrl.ring_size() {
            0 => None,
            size_bits => Some(Ring {
                side: if ctrl.ring_sel() { RingSide::Write } else { RingSide::Read },
                size_bits,
            }),
        };
        Some(Self {
            enable: ctrl.en(),
            high_priority: ctrl.high_priority(),
            data_size: DataSize::from_field(ctrl.data_size())?,
            incr_read: ctrl.incr_read(),
            incr_write: ctrl.incr_write(),
            ring,
            chain_to: (chain_to != channel).then_some(chain_to),
            treq: TransferRequest::from_field(ctrl.treq_sel())?,
            irq_quiet: ctrl.irq_quiet(),
        })
    }
}

#[derive(Debug, Copy, Clone, Default)]
pub struct Channel {
    pub read_addr: u32,
    pub write_addr: u32,
    /// Remaining transfers while busy.
    pub trans_count: u32,
    /// Count loaded on the next trigger.
    pub count_reload: u32,
    pub ctrl: ChannelCtrl,
    /// Raw completion interrupt.
    pub completed: bool,
}

impl Channel {
    pub fn busy(&self) -> bool {
        self.ctrl.busy()
    }
}

/// Row port latch, wired to the pixel reader and writer.
#[derive(Debug, Copy, Clone, Default)]
pub struct RowPort {
    pub reader: usize,
    pub writer: usize,
    pub row_words: u32,
    /// Destination row address marking the end of work.
    pub sentinel: u32,
}

fn advance(address: u32, size: DataSize, ring_bits: Option<u8>) -> u32 {
    let next = address.wrapping_add(size.bytes());
    match ring_bits {
        Some(bits) if bits > 0 => {
            let mut wrapped = address;
            wrapped.set_bits(0..bits as usize, next.get_bits(0..bits as usize));
            wrapped
        }
        _ => next,
    }
}

#[derive(Debug, Default)]
pub struct Dma {
    pub channels: [Channel; CHANNEL_COUNT],
    pub row_port: RowPort,
    pub transfers: u64,
}

impl Dma {
    pub fn channel(&self, index: usize) -> &Channel {
        &self.channels[index]
    }

    /// Clears every channel: not busy, not enabled, counts and flags zero.
    pub fn abort_all(&mut self) {
        for (index, channel) in self.channels.iter_mut().enumerate() {
            if channel.busy() {
                debug!(target: "dma", "aborting ch{} with {} transfers left", index, channel.trans_count);
            }
            *channel = Channel::default();
        }
        self.row_port = RowPort::default();
    }

    pub fn clear_completed(&mut self, index: usize) {
        self.channels[index].completed = false;
    }

    pub fn set_row_port(&mut self, row_port: RowPort) {
        self.row_port = row_port;
    }

    pub fn trigger(&mut self, index: usize) {
        let channel = &mut self.channels[index];
        if !channel.ctrl.en() {
            warn!(target: "dma", "trigger on disabled ch{}", index);
            return;
        }
        if channel.busy() {
            trace!(target: "dma", "ch{} already busy, trigger ignored", index);
            return;
        }
        if channel.count_reload == 0 {
            trace!(target: "dma", "ch{} triggered with zero count", index);
            self.complete(index);
            return;
        }
        channel.trans_count = channel.count_reload;
        channel.ctrl.set_busy(true);
    }

    fn complete(&mut self, index: usize) {
        let channel = &mut self.channels[index];
        channel.ctrl.set_busy(false);
        channel.trans_count = 0;
        if !channel.ctrl.irq_quiet() {
            channel.completed = true;
        }
        let chain_to = channel.ctrl.chain_to() as usize;
        trace!(target: "dma", "ch{} complete, chain to ch{}", index, chain_to);
        if chain_to != index && chain_to < CHANNEL_COUNT {
            self.trigger(chain_to);
        }
    }

    /// Register write from the CPU or from another channel.
    pub fn write_register(&mut self, address: u32, data: u32) {
        if address == ROW_READ {
            self.channels[self.row_port.reader].read_addr = data;
            return;
        }
        if address == ROW_WRITE_TRIG {
            let RowPort { reader, writer, row_words, sentinel } = self.row_port;
            self.channels[writer].write_addr = data;
            self.channels[reader].count_reload = if data == sentinel { 1 } else { row_words };
            self.trigger(reader);
            return;
        }

        let offset = address.wrapping_sub(DMA_BASE);
        let index = (offset / CHANNEL_STRIDE) as usize;
        if index >= CHANNEL_COUNT {
            warn!(target: "dma", "write to unmapped dma register {:#010x}", address);
            return;
        }
        let channel = &mut self.channels[index];
        match offset % CHANNEL_STRIDE {
            READ_ADDR => channel.read_addr = data,
            WRITE_ADDR => channel.write_addr = data,
            TRANS_COUNT => channel.count_reload = data,
            CTRL_TRIG => {
                // busy is read only
                let busy = channel.ctrl.busy();
                channel.ctrl = ChannelCtrl(data);
                channel.ctrl.set_busy(busy);
                self.trigger(index);
            }
            READ_ADDR_TRIG => {
                channel.read_addr = data;
                self.trigger(index);
            }
            TRANS_COUNT_TRIG => {
                channel.count_reload = data;
                self.trigger(index);
            }
            other => warn!(target: "dma", "write to unknown ch{} register {:#x}", index, other),
        }
    }

    /// Writes into a busy channel's registers wait until it finishes.
    fn write_stalls(&self, address: u32) -> bool {
        let busy = |index: usize| self.channels[index].busy();
        if address == ROW_READ {
            busy(self.row_port.reader)
        } else if address == ROW_WRITE_TRIG {
            busy(self.row_port.reader) || busy(self.row_port.writer)
        } else {
            let index = (address.wrapping_sub(DMA_BASE) / CHANNEL_STRIDE) as usize;
            index < CHANNEL_COUNT && busy(index)
        }
    }

    fn request_ready(&self, index: usize, bus: &SystemBus<'_, '_>) -> bool {
        match TransferRequest::from_field(self.channels[index].ctrl.treq_sel()) {
            Some(TransferRequest::Permanent) => true,
            Some(TransferRequest::PioTx) => bus.tx_ready(),
            Some(TransferRequest::PioRx) => bus.rx_ready(),
            None => false,
        }
    }

    /// One transfer on `index` if it is busy, paced and not stalled.
    fn service(&mut self, index: usize, bus: &mut SystemBus<'_, '_>) -> bool {
        let channel = self.channels[index];
        if !channel.busy() || !self.request_ready(index, bus) {
            return false;
        }

        let write_addr = channel.write_addr;
        let to_dma = (DMA_BASE..DMA_END).contains(&write_addr);
        if to_dma && self.write_stalls(write_addr) {
            return false;
        }

        let Some(size) = DataSize::from_field(channel.ctrl.data_size()) else {
            warn!(target: "dma", "ch{} has a reserved data size, aborting", index);
            self.channels[index] = Channel::default();
            return false;
        };

        let data = bus.read(channel.read_addr, size);
        if to_dma {
            self.write_register(write_addr, data);
        } else {
            bus.write(write_addr, data, size);
        }
        self.transfers += 1;

        let ring = channel.ctrl.ring_size();
        let ring_read = (ring > 0 && !channel.ctrl.ring_sel()).then_some(ring);
        let ring_write = (ring > 0 && channel.ctrl.ring_sel()).then_some(ring);

        // the write above may have reprogrammed this channel
        let current = &mut self.channels[index];
        if channel.ctrl.incr_read() {
            current.read_addr = advance(channel.read_addr, size, ring_read);
        }
        if channel.ctrl.incr_write() {
            current.write_addr = advance(current.write_addr, size, ring_write);
        }
        current.trans_count = current.trans_count.saturating_sub(1);
        if current.trans_count == 0 {
            self.complete(index);
        }
        true
    }

    /// Advances every channel by one cycle. Channels triggered by a chain in
    /// this cycle get their first transfer in the same cycle.
    pub fn cycle(&mut self, bus: &mut SystemBus<'_, '_>) {
        let mut serviced = [false; CHANNEL_COUNT];
        loop {
            let mut progressed = false;
            for index in 0..CHANNEL_COUNT {
                if !serviced[index] && self.service(index, bus) {
                    serviced[index] = true;
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use pscale_pio::CpuLookup;

    use super::*;
    use crate::bus::{Memory, SCRATCH_BASE, SPRITE_BASE};

    fn copy_config() -> ChannelConfig {
        ChannelConfig { irq_quiet: false, ..ChannelConfig::default() }
    }

    #[test]
    fn pack_round_trip() {
        let configs = [
            copy_config(),
            ChannelConfig {
                data_size: DataSize::HalfWord,
                incr_read: false,
                chain_to: Some(4),
                treq: TransferRequest::PioRx,
                ring: Some(Ring { side: RingSide::Write, size_bits: 3 }),
                ..ChannelConfig::default()
            },
            ChannelConfig {
                ring: Some(Ring { side: RingSide::Read, size_bits: 5 }),
                treq: TransferRequest::PioTx,
                high_priority: true,
                ..ChannelConfig::default()
            },
        ];
        for (channel, config) in configs.iter().enumerate() {
            let ctrl = config.pack(channel);
            assert!(!ctrl.busy());
            assert_eq!(ChannelConfig::unpack(ctrl, channel), Some(*config));
        }
        assert_eq!(copy_config().pack(3).chain_to(), 3);
        assert_eq!(ChannelConfig::unpack(ChannelCtrl::from_bits(0b1100), 0), None);
    }

    #[test]
    fn ring_wraps_on_the_boundary() {
        assert_eq!(advance(0x2000_001c, DataSize::Word, Some(5)), 0x2000_0000);
        assert_eq!(advance(0x2000_0004, DataSize::Word, Some(3)), 0x2000_0000);
        assert_eq!(advance(0x2000_0004, DataSize::Word, None), 0x2000_0008);
    }

    #[test]
    fn copies_count_then_completes() {
        let sprite = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut scratch = vec![0u16; 4];
        let mut memory = Memory { sprite: &sprite, palette: &[], addresses: &[], scratch: &mut scratch };
        let mut lookup = CpuLookup::new();
        let mut bus = SystemBus { memory: &mut memory, lookup: &mut lookup };

        let mut dma = Dma::default();
        dma.write_register(channel_register(0, READ_ADDR), SPRITE_BASE);
        dma.write_register(channel_register(0, WRITE_ADDR), SCRATCH_BASE);
        dma.write_register(channel_register(0, TRANS_COUNT), 2);
        dma.write_register(channel_register(0, CTRL_TRIG), copy_config().pack(0).bits());
        assert!(dma.channel(0).busy());

        dma.cycle(&mut bus);
        assert_eq!(dma.channel(0).trans_count, 1);
        dma.cycle(&mut bus);
        assert!(!dma.channel(0).busy());
        assert!(dma.channel(0).completed);
        assert_eq!(dma.transfers, 2);
        drop(bus);
        assert_eq!(scratch, [0x0201, 0x0403, 0x0605, 0x0807]);
    }

    #[test]
    fn zero_count_completes_and_chains_immediately() {
        let mut dma = Dma::default();
        let second = ChannelConfig { chain_to: None, ..copy_config() };
        dma.write_register(channel_register(1, TRANS_COUNT), 0);
        dma.channels[1].ctrl = second.pack(1);

        let first = ChannelConfig { chain_to: Some(1), ..copy_config() };
        dma.write_register(channel_register(0, TRANS_COUNT), 0);
        dma.write_register(channel_register(0, CTRL_TRIG), first.pack(0).bits());

        assert!(dma.channel(0).completed);
        assert!(dma.channel(1).completed);
        assert!(!dma.channel(1).busy());
    }

    #[test]
    fn writes_to_a_busy_channel_stall() {
        let sprite = [0u8; 8];
        let mut memory = Memory { sprite: &sprite, palette: &[], addresses: &[], scratch: &mut [] };
        let mut lookup = CpuLookup::new();
        let mut bus = SystemBus { memory: &mut memory, lookup: &mut lookup };

        let mut dma = Dma::default();
        // ch1 is paced by a FIFO that never fills, so it stays busy
        let waiting = ChannelConfig { treq: TransferRequest::PioRx, ..copy_config() };
        dma.write_register(channel_register(1, TRANS_COUNT), 1);
        dma.write_register(channel_register(1, CTRL_TRIG), waiting.pack(1).bits());

        let poke = ChannelConfig { incr_write: false, ..copy_config() };
        dma.write_register(channel_register(0, READ_ADDR), SPRITE_BASE);
        dma.write_register(channel_register(0, WRITE_ADDR), channel_register(1, READ_ADDR));
        dma.write_register(channel_register(0, TRANS_COUNT), 1);
        dma.write_register(channel_register(0, CTRL_TRIG), poke.pack(0).bits());

        for _ in 0..4 {
            dma.cycle(&mut bus);
        }
        assert!(dma.channel(0).busy());
        assert_eq!(dma.transfers, 0);

        dma.abort_all();
        assert!(!dma.channel(0).busy());
        assert!(!dma.channel(1).busy());
        assert_eq!(dma.channel(1).ctrl.bits(), 0);
    }
}
