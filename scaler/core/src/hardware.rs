use log::{trace, warn};
use pscale_pio::LookupUnit;

use crate::bus::{Memory, SystemBus, PALETTE_BASE};
use crate::chain::{self, AddressList, AddressPair, ChainPlan};
use crate::dma::Dma;
use crate::error::ConfigError;
use crate::interp::{FixedPoint, Interpolator};
use crate::pattern::Scale;

/// Counters for what the engine did to the hardware.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct HardwareStats {
    pub configurations: u32,
    pub starts: u32,
    pub resets: u32,
    pub cycles: u64,
}

/// Everything one draw programs into the units.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HardwareSetup {
    pub source_base: u32,
    pub source_stride: u32,
    pub fixed: FixedPoint,
    pub v_scale: Scale,
    pub scratch_base: u32,
    pub scratch_stride: u32,
    pub rows: u32,
    pub chain: ChainPlan,
    pub first_slot: u32,
}

/// The interpolator, the transfer channels and the lookup unit, owned for
/// the life of the engine.
#[derive(Debug)]
pub struct Hardware<L: LookupUnit> {
    pub dma: Dma,
    pub interp: Interpolator,
    pub lookup: L,
    pub stats: HardwareStats,
}

impl<L: LookupUnit> Hardware<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            dma: Dma::default(),
            interp: Interpolator::default(),
            lookup,
            stats: HardwareStats::default(),
        }
    }

    /// One clock for the channels, then one for the lookup unit.
    pub fn cycle(&mut self, memory: &mut Memory<'_>) {
        let mut bus = SystemBus { memory, lookup: &mut self.lookup };
        self.dma.cycle(&mut bus);
        self.lookup.step();
        self.stats.cycles += 1;
    }

    /// Both completion signals observed.
    pub fn finished(&self) -> bool {
        self.lookup.finished() && chain::feeder_done(&self.dma)
    }

    pub fn reset(&mut self) {
        self.dma.abort_all();
        self.interp.reset();
        self.lookup.restart();
        self.stats.resets += 1;
        trace!(target: "scaler", "hardware reset");
    }

    /// Takes the units for one draw. They are reset when the returned guard
    /// goes away, however the draw ends.
    pub fn activate(&mut self) -> ActiveChain<'_, L> {
        ActiveChain { hardware: self }
    }
}

pub struct ActiveChain<'h, L: LookupUnit> {
    hardware: &'h mut Hardware<L>,
}

impl<'h, L: LookupUnit> Drop for ActiveChain<'h, L> {
    fn drop(&mut self) {
        self.hardware.reset();
    }
}

impl<'h, L: LookupUnit> ActiveChain<'h, L> {
    /// Programs the interpolator, fills `addresses` with one pair per row
    /// and the sentinel, and programs the channels.
    pub fn configure(&mut self, setup: &HardwareSetup, addresses: &mut AddressList) -> Result<(), ConfigError> {
        let hw = &mut *self.hardware;
        hw.stats.configurations += 1;

        hw.interp.reset();
        hw.interp.configure_read(setup.source_base, setup.source_stride, setup.fixed, setup.v_scale);
        hw.interp.configure_write(setup.scratch_base, setup.scratch_stride);

        addresses.clear();
        for _ in 0..setup.rows {
            let (read, write) = hw.interp.pop_pair();
            addresses
                .push(AddressPair { read, write })
                .map_err(|_| ConfigError::AddressListFull { rows: setup.rows as usize })?;
        }
        addresses
            .push(AddressPair::SENTINEL)
            .map_err(|_| ConfigError::AddressListFull { rows: setup.rows as usize })?;

        chain::configure(&mut hw.dma, &setup.chain);
        Ok(())
    }

    /// Hands the palette base to the lookup unit and starts the chain.
    pub fn start(&mut self, setup: &HardwareSetup) {
        let hw = &mut *self.hardware;
        hw.lookup.clear_finished();
        if !hw.lookup.put(PALETTE_BASE) {
            warn!(target: "scaler", "lookup unit refused the palette base");
        }
        chain::start(&mut hw.dma, &setup.chain, setup.first_slot);
        hw.stats.starts += 1;
    }

    pub fn cycle(&mut self, memory: &mut Memory<'_>) {
        self.hardware.cycle(memory);
    }

    pub fn finished(&self) -> bool {
        self.hardware.finished()
    }

    pub fn hardware(&self) -> &Hardware<L> {
        self.hardware
    }
}

#[cfg(test)]
mod tests {
    use pscale_pio::CpuLookup;

    use super::*;
    use crate::bus::{pattern_address, SPRITE_BASE};

    fn setup(rows: u32) -> HardwareSetup {
        HardwareSetup {
            source_base: SPRITE_BASE,
            source_stride: 16,
            fixed: FixedPoint { frac_bits: 12 },
            v_scale: Scale::ONE,
            scratch_base: crate::bus::SCRATCH_BASE,
            scratch_stride: 32,
            rows,
            chain: ChainPlan { columns: 16, pattern: pattern_address(8) },
            first_slot: 1,
        }
    }

    #[test]
    fn guard_resets_on_drop() {
        let mut hardware = Hardware::new(CpuLookup::new());
        let mut addresses = AddressList::new();
        {
            let mut chain = hardware.activate();
            chain.configure(&setup(4), &mut addresses).unwrap();
            chain.start(&setup(4));
            assert!(chain.hardware().dma.channel(0).busy());
        }
        assert_eq!(hardware.stats.resets, 1);
        assert_eq!(hardware.stats.starts, 1);
        assert!(!hardware.dma.channel(0).busy());
        assert_eq!(hardware.interp.read.accum, 0);
    }

    #[test]
    fn address_list_ends_with_the_sentinel() {
        let mut hardware = Hardware::new(CpuLookup::new());
        let mut addresses = AddressList::new();
        hardware.activate().configure(&setup(3), &mut addresses).unwrap();

        assert_eq!(addresses.len(), 4);
        assert_eq!(addresses[1], AddressPair { read: SPRITE_BASE + 16, write: crate::bus::SCRATCH_BASE + 32 });
        assert_eq!(addresses[3], AddressPair::SENTINEL);
    }

    #[test]
    fn overfull_address_list_is_an_error() {
        let mut hardware = Hardware::new(CpuLookup::new());
        let mut addresses = AddressList::new();
        let rows = crate::chain::ADDRESS_LIST_ROWS as u32 + 1;
        let result = hardware.activate().configure(&setup(rows), &mut addresses);
        assert_eq!(result, Err(ConfigError::AddressListFull { rows: rows as usize }));
        assert_eq!(hardware.stats.resets, 1);
    }
}
