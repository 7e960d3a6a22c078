use crate::chain::ADDRESS_LIST_ROWS;
use crate::error::ConfigError;

/// Widest display the write lane and scratch pool are laid out for.
pub const MAX_DISPLAY_WIDTH: u32 = 1024;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub display_width: u32,
    pub display_height: u32,
    /// Extra rows and columns on the full-screen scratch buffer, room for
    /// the columns rendered past the right edge and the clipped lead-in.
    pub scratch_margin: u32,
    /// Hardware cycles a draw may take before it is reported as hung.
    pub poll_limit: u32,
    /// Poll iterations between yields in `draw_sprite_async`.
    pub yield_interval: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            display_width: 96,
            display_height: 64,
            scratch_margin: 128,
            poll_limit: 8_000_000,
            yield_interval: 4096,
        }
    }
}

impl EngineConfig {
    pub fn with_display(mut self, width: u32, height: u32) -> Self {
        self.display_width = width;
        self.display_height = height;
        self
    }

    pub fn with_scratch_margin(mut self, margin: u32) -> Self {
        self.scratch_margin = margin;
        self
    }

    pub fn with_poll_limit(mut self, limit: u32) -> Self {
        self.poll_limit = limit;
        self
    }

    pub fn with_yield_interval(mut self, interval: u32) -> Self {
        self.yield_interval = interval.max(1);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let too_large = ConfigError::DisplayTooLarge {
            width: self.display_width,
            height: self.display_height,
        };
        if self.display_width == 0 || self.display_height == 0 {
            return Err(too_large);
        }
        if self.display_width > MAX_DISPLAY_WIDTH || self.display_height as usize > ADDRESS_LIST_ROWS {
            return Err(too_large);
        }
        Ok(())
    }
}
