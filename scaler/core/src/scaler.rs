//! The draw call.
//!
//! ```ignore
//! let mut scaler = SpriteScaler::new(EngineConfig::default())?;
//! let sprite = SpriteDescriptor::new(16, 16, &pixels, &palette, 0)?;
//! let mut screen = Surface::new(&mut framebuffer, 96, 64)?;
//! scaler.draw_sprite(&mut screen, &sprite, -4, 20, 1.5, 1.5)?;
//! ```
//!
//! Every draw runs configure, start, drain and reset in that order on
//! hardware owned by the engine. Only one draw can be in flight since
//! `draw_sprite` takes `&mut self`.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use log::{debug, error, trace};
use pscale_pio::{LookupUnit, Microsequencer};

use crate::bus::{pattern_address, Memory};
use crate::chain::{AddressList, AddressPair, ChainPlan, ADDRESS_LIST_ROWS};
use crate::clip::ClipState;
use crate::config::EngineConfig;
use crate::error::{ConfigError, ScalerError};
use crate::hardware::{ActiveChain, Hardware, HardwareSetup, HardwareStats};
use crate::interp::{FixedPoint, ACCUM_BITS};
use crate::pattern::{pattern_for, Scale};
use crate::scratch::{ScratchId, ScratchPool};
use crate::sprite::{check_size, SpriteDescriptor, Surface};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DrawResult {
    Drawn,
    /// Nothing of the sprite reached the destination; the hardware was not touched.
    Skipped,
}

#[derive(Debug, Copy, Clone)]
struct DrawPlan {
    clip: ClipState,
    scratch: ScratchId,
    key: u16,
    setup: HardwareSetup,
}

enum Progress {
    Finished,
    Running,
    Hung,
}

/// Runs the chain for at most `slice` cycles.
fn run_for<L: LookupUnit>(
    chain: &mut ActiveChain<'_, L>,
    memory: &mut Memory<'_>,
    iterations: &mut u32,
    limit: u32,
    slice: u32,
) -> Progress {
    for _ in 0..slice {
        if chain.finished() {
            return Progress::Finished;
        }
        if *iterations >= limit {
            return Progress::Hung;
        }
        chain.cycle(memory);
        *iterations += 1;
    }
    if chain.finished() {
        Progress::Finished
    } else {
        Progress::Running
    }
}

/// Pending once, then ready.
#[derive(Default)]
struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Scales indexed sprites into a destination surface.
pub struct SpriteScaler<L: LookupUnit = Microsequencer> {
    config: EngineConfig,
    hardware: Hardware<L>,
    pool: ScratchPool,
    addresses: AddressList,
    last_scratch: Option<ScratchId>,
}

impl SpriteScaler<Microsequencer> {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_lookup(config, Microsequencer::new())
    }
}

impl<L: LookupUnit> SpriteScaler<L> {
    /// Same engine with a different palette lookup unit, e.g. [`pscale_pio::CpuLookup`].
    pub fn with_lookup(config: EngineConfig, lookup: L) -> Result<Self, ConfigError> {
        config.validate()?;
        let pool = ScratchPool::new(config.display_width, config.display_height, config.scratch_margin);
        debug!(target: "scaler", "engine up: display {}x{}, poll limit {}",
            config.display_width, config.display_height, config.poll_limit);
        Ok(Self {
            config,
            hardware: Hardware::new(lookup),
            pool,
            addresses: AddressList::new(),
            last_scratch: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_poll_limit(&mut self, limit: u32) {
        self.config.poll_limit = limit;
    }

    pub fn stats(&self) -> HardwareStats {
        self.hardware.stats
    }

    pub fn scratch(&self) -> &ScratchPool {
        &self.pool
    }

    /// Buffer used by the most recent draw that reached the hardware.
    pub fn last_scratch(&self) -> Option<ScratchId> {
        self.last_scratch
    }

    /// Address list of the most recent draw, sentinel included.
    pub fn address_list(&self) -> &[AddressPair] {
        &self.addresses
    }

    pub fn lookup(&self) -> &L {
        &self.hardware.lookup
    }

    /// Draws `sprite` with its top left corner at (`x`, `y`), scaled by
    /// the table entries closest to `h_scale` and `v_scale`. Blocks until
    /// the hardware finishes or `poll_limit` cycles have passed.
    pub fn draw_sprite(
        &mut self,
        target: &mut Surface<'_>,
        sprite: &SpriteDescriptor<'_>,
        x: i32,
        y: i32,
        h_scale: f64,
        v_scale: f64,
    ) -> Result<DrawResult, ScalerError> {
        let Some(plan) = self.plan(target, sprite, x, y, h_scale, v_scale)? else {
            return Ok(DrawResult::Skipped);
        };

        let mut chain = self.hardware.activate();
        chain.configure(&plan.setup, &mut self.addresses)?;
        let mut memory = Memory {
            sprite: sprite.pixels(),
            palette: sprite.palette(),
            addresses: &self.addresses,
            scratch: self.pool.storage_mut(),
        };
        chain.start(&plan.setup);

        let mut iterations = 0;
        let limit = self.config.poll_limit;
        loop {
            match run_for(&mut chain, &mut memory, &mut iterations, limit, u32::MAX) {
                Progress::Finished => break,
                Progress::Running => {}
                Progress::Hung => {
                    error!(target: "scaler", "draw at ({}, {}) hung after {} iterations", x, y, iterations);
                    return Err(ScalerError::HardwareHang { iterations });
                }
            }
        }
        drop(chain);

        self.finish(&plan, target, iterations);
        Ok(DrawResult::Drawn)
    }

    /// [`draw_sprite`](Self::draw_sprite) that yields to the executor every
    /// `yield_interval` cycles while the chain runs.
    pub async fn draw_sprite_async(
        &mut self,
        target: &mut Surface<'_>,
        sprite: &SpriteDescriptor<'_>,
        x: i32,
        y: i32,
        h_scale: f64,
        v_scale: f64,
    ) -> Result<DrawResult, ScalerError> {
        let Some(plan) = self.plan(target, sprite, x, y, h_scale, v_scale)? else {
            return Ok(DrawResult::Skipped);
        };

        let mut chain = self.hardware.activate();
        chain.configure(&plan.setup, &mut self.addresses)?;
        let mut memory = Memory {
            sprite: sprite.pixels(),
            palette: sprite.palette(),
            addresses: &self.addresses,
            scratch: self.pool.storage_mut(),
        };
        chain.start(&plan.setup);

        let mut iterations = 0;
        let limit = self.config.poll_limit;
        let slice = self.config.yield_interval.max(1);
        loop {
            match run_for(&mut chain, &mut memory, &mut iterations, limit, slice) {
                Progress::Finished => break,
                Progress::Running => YieldNow::default().await,
                Progress::Hung => {
                    error!(target: "scaler", "draw at ({}, {}) hung after {} iterations", x, y, iterations);
                    return Err(ScalerError::HardwareHang { iterations });
                }
            }
        }
        drop(chain);

        self.finish(&plan, target, iterations);
        Ok(DrawResult::Drawn)
    }

    /// Snaps, clips and picks a scratch buffer. `None` for a draw with
    /// nothing visible.
    fn plan(
        &mut self,
        target: &Surface<'_>,
        sprite: &SpriteDescriptor<'_>,
        x: i32,
        y: i32,
        h_scale: f64,
        v_scale: f64,
    ) -> Result<Option<DrawPlan>, ConfigError> {
        let h = Scale::snap(h_scale);
        let v = Scale::snap(v_scale);
        check_size(sprite.width(), sprite.height())?;
        let side = sprite.width();

        let Some(clip) = ClipState::compute(side, h, v, x, y, target.width(), target.height()) else {
            trace!(target: "scaler", "sprite at ({}, {}) scaled {}x{} is off screen", x, y, h.as_f64(), v.as_f64());
            return Ok(None);
        };

        let scratch = self
            .pool
            .select(clip.rendered_width, clip.visible_height)
            .ok_or(ConfigError::NoScratchBuffer { width: clip.rendered_width, height: clip.visible_height })?;
        let fixed = FixedPoint::derive(side, ADDRESS_LIST_ROWS as u32, ACCUM_BITS)?;

        let key = sprite.key_color();
        self.pool.clear(scratch, key);
        self.last_scratch = Some(scratch);

        debug!(target: "scaler", "draw {}x{} at ({}, {}) scale {}/8 x {}/8 into scratch {} ({} columns, {} rows)",
            side, side, x, y, h.eighths(), v.eighths(), scratch.index(), clip.rendered_columns, clip.visible_height);

        let setup = HardwareSetup {
            source_base: clip.source_base,
            source_stride: side,
            fixed,
            v_scale: v,
            scratch_base: self.pool.address(scratch),
            scratch_stride: self.pool.stride(scratch),
            rows: clip.visible_height,
            chain: ChainPlan { columns: clip.rendered_columns, pattern: pattern_address(h.eighths()) },
            first_slot: pattern_for(h)[0],
        };
        Ok(Some(DrawPlan { clip, scratch, key, setup }))
    }

    fn finish(&mut self, plan: &DrawPlan, target: &mut Surface<'_>, iterations: u32) {
        self.pool.composite(plan.scratch, &plan.clip, plan.key, target);
        debug!(target: "scaler", "drawn in {} cycles, {}x{} visible at ({}, {})",
            iterations, plan.clip.visible_width, plan.clip.visible_height, plan.clip.dst_x, plan.clip.dst_y);
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use pscale_pio::CpuLookup;

    use super::*;

    fn checker() -> (Vec<u8>, [u16; 4]) {
        let pixels = (0..256u32).map(|i| ((i % 16 + i / 16) % 4) as u8).collect();
        (pixels, [0xf81f, 0x1111, 0x2222, 0x3333])
    }

    #[test]
    fn unit_scale_copies_the_resolved_pixels() {
        let (pixels, palette) = checker();
        let sprite = SpriteDescriptor::new(16, 16, &pixels, &palette, 0).unwrap();
        let mut scaler = SpriteScaler::new(EngineConfig::default()).unwrap();
        let mut screen = vec![0u16; 96 * 64];
        let mut surface = Surface::new(&mut screen, 96, 64).unwrap();

        let result = scaler.draw_sprite(&mut surface, &sprite, 0, 0, 1.0, 1.0).unwrap();
        assert_eq!(result, DrawResult::Drawn);

        let id = scaler.last_scratch().unwrap();
        let view = scaler.scratch().view(id);
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(view[(y * 16 + x) as usize], sprite.color_at(x, y).unwrap());
            }
        }
        assert_eq!(scaler.stats().starts, 1);
        assert_eq!(scaler.stats().resets, 1);
    }

    #[test]
    fn off_screen_draw_touches_nothing() {
        let (pixels, palette) = checker();
        let sprite = SpriteDescriptor::new(16, 16, &pixels, &palette, 0).unwrap();
        let mut scaler = SpriteScaler::with_lookup(EngineConfig::default(), CpuLookup::new()).unwrap();
        let mut screen = vec![0u16; 96 * 64];
        let mut surface = Surface::new(&mut screen, 96, 64).unwrap();

        let result = scaler.draw_sprite(&mut surface, &sprite, -40, 0, 1.0, 1.0).unwrap();
        assert_eq!(result, DrawResult::Skipped);
        assert_eq!(scaler.stats(), HardwareStats::default());
        assert_eq!(scaler.last_scratch(), None);
    }
}
