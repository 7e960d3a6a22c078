//! Two-lane fixed-point address interpolator.
//!
//! Lane 0 walks source rows, lane 1 walks scratch rows. Each `pop` returns
//! `base + ((accum >> shift) & mask)` and then adds `step` to the
//! accumulator.

use bitfield::bitfield;
use log::trace;

use crate::error::ConfigError;
use crate::pattern::Scale;

pub const ACCUM_BITS: u32 = 32;

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq, Default)]
    pub struct LaneCtrl(u32);
    impl Debug;
    pub u8, shift, set_shift: 4, 0;
    pub u8, mask_lsb, set_mask_lsb: 9, 5;
    pub u8, mask_msb, set_mask_msb: 14, 10;
}

impl LaneCtrl {
    pub fn new(shift: u8, mask_lsb: u8, mask_msb: u8) -> Self {
        let mut ctrl = LaneCtrl(0);
        ctrl.set_shift(shift);
        ctrl.set_mask_lsb(mask_lsb);
        ctrl.set_mask_msb(mask_msb);
        ctrl
    }

    /// No shift, all 32 bits.
    pub fn passthrough() -> Self {
        Self::new(0, 0, 31)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn mask(&self) -> u32 {
        let lsb = self.mask_lsb() as u32;
        let msb = self.mask_msb() as u32;
        if lsb > msb {
            return 0;
        }
        (u32::MAX >> (31 - msb)) & (u32::MAX << lsb)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Lane {
    pub base: u32,
    pub step: u32,
    pub accum: u32,
    pub ctrl: LaneCtrl,
}

impl Lane {
    pub fn peek(&self) -> u32 {
        let shifted = self.accum >> self.ctrl.shift();
        self.base.wrapping_add(shifted & self.ctrl.mask())
    }

    pub fn pop(&mut self) -> u32 {
        let value = self.peek();
        self.accum = self.accum.wrapping_add(self.step);
        value
    }
}

/// Fractional bits for the read lane's row accumulator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FixedPoint {
    pub frac_bits: u32,
}

/// Smallest `F` with `stride << F > max_rows * 64`, if the accumulator can
/// hold `max_rows` steps at the smallest scale.
///
/// With that margin the accumulated rounding error of `ceil(stride << F * 8 /
/// k)` stays below one `k`-th of a row for every `k` up to 64 eighths, so
/// `floor(r * 8 / k)` comes out exact.
pub const fn frac_bits_for(stride: u32, max_rows: u32, accum_bits: u32) -> Option<u32> {
    if stride == 0 || !stride.is_power_of_two() || accum_bits == 0 || accum_bits > 64 {
        return None;
    }
    let limit = max_rows as u64 * 64;
    let mut frac = 0;
    while (stride as u64) << frac <= limit {
        frac += 1;
        if frac >= 32 {
            return None;
        }
    }
    let unit = (stride as u64) << frac;
    // largest accumulator value: max_rows steps at 1/8 scale
    let peak = max_rows as u64 * (unit * 8 + 1);
    if accum_bits < 64 && peak >= 1u64 << accum_bits {
        return None;
    }
    Some(frac)
}

impl FixedPoint {
    pub const fn derive(stride: u32, max_rows: u32, accum_bits: u32) -> Result<Self, ConfigError> {
        match frac_bits_for(stride, max_rows, accum_bits) {
            Some(frac_bits) => Ok(FixedPoint { frac_bits }),
            None => Err(ConfigError::FixedPointOverflow { stride, rows: max_rows, accum_bits }),
        }
    }

    /// Accumulator step that advances `8 / scale` rows per pop.
    pub const fn row_step(&self, stride: u32, scale: Scale) -> u32 {
        let unit = (stride as u64) << self.frac_bits;
        ((unit * 8 + scale.eighths() as u64 - 1) / scale.eighths() as u64) as u32
    }
}

#[derive(Debug, Default)]
pub struct Interpolator {
    pub read: Lane,
    pub write: Lane,
}

impl Interpolator {
    pub fn reset(&mut self) {
        self.read = Lane::default();
        self.write = Lane::default();
    }

    /// Read lane over sprite rows of `stride` bytes, repeating rows for
    /// vertical scales above 1 and skipping them below.
    pub fn configure_read(&mut self, base: u32, stride: u32, fixed: FixedPoint, scale: Scale) {
        let stride_bits = stride.trailing_zeros() as u8;
        self.read = Lane {
            base,
            step: fixed.row_step(stride, scale),
            accum: 0,
            ctrl: LaneCtrl::new(fixed.frac_bits as u8, stride_bits, 31),
        };
        trace!(target: "interp", "read lane base {:#010x} step {:#x} ctrl {:?}", base, self.read.step, self.read.ctrl);
    }

    pub fn configure_write(&mut self, base: u32, stride_bytes: u32) {
        self.write = Lane {
            base,
            step: stride_bytes,
            accum: 0,
            ctrl: LaneCtrl::passthrough(),
        };
        trace!(target: "interp", "write lane base {:#010x} step {}", base, stride_bytes);
    }

    /// (source row address, scratch row address)
    pub fn pop_pair(&mut self) -> (u32, u32) {
        (self.read.pop(), self.write.pop())
    }
}
