//! Hardware-assisted sprite scaling.
//!
//! An 8-bit indexed sprite is expanded through its palette and scaled by
//! eighths on its way into a scratch buffer, entirely by the transfer
//! channels, the address interpolator and the palette lookup unit. The CPU
//! only configures the units, waits, and composites the result.

#![no_std]

extern crate alloc;

pub mod bus;
pub mod chain;
pub mod clip;
pub mod config;
pub mod dma;
pub mod error;
pub mod hardware;
pub mod interp;
pub mod pattern;
pub mod scaler;
pub mod scratch;
pub mod sprite;

pub use config::EngineConfig;
pub use error::{ConfigError, ScalerError};
pub use hardware::HardwareStats;
pub use pattern::{find_closest_scale, get_pattern, Scale, ScalePattern};
pub use scaler::{DrawResult, SpriteScaler};
pub use sprite::{SpriteDescriptor, Surface};

pub use pscale_pio::{CpuLookup, LookupUnit, Microsequencer};
