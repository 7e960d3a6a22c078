use crate::error::ConfigError;

/// Largest palette the lookup program can address. Index 255 in all four
/// lanes of a packed word would read as the end-of-sprite marker.
pub const MAX_PALETTE_ENTRIES: usize = 255;

pub const SUPPORTED_SIDES: [u32; 2] = [16, 32];

/// Square 8-bit indexed sprite with an RGB565 palette.
///
/// Validated once here; the pipeline relies on every index being in range.
#[derive(Debug, Copy, Clone)]
pub struct SpriteDescriptor<'a> {
    width: u32,
    height: u32,
    pixels: &'a [u8],
    palette: &'a [u16],
    color_key: u8,
}

pub(crate) fn check_size(width: u32, height: u32) -> Result<(), ConfigError> {
    if width != height || !SUPPORTED_SIDES.contains(&width) {
        return Err(ConfigError::UnsupportedSize { width, height });
    }
    Ok(())
}

impl<'a> SpriteDescriptor<'a> {
    pub fn new(
        width: u32,
        height: u32,
        pixels: &'a [u8],
        palette: &'a [u16],
        color_key: u8,
    ) -> Result<Self, ConfigError> {
        check_size(width, height)?;

        if palette.is_empty() {
            return Err(ConfigError::EmptyPalette);
        }
        if palette.len() > MAX_PALETTE_ENTRIES {
            return Err(ConfigError::PaletteTooLarge { len: palette.len(), max: MAX_PALETTE_ENTRIES });
        }
        if color_key as usize >= palette.len() {
            return Err(ConfigError::ColorKeyOutOfRange { key: color_key, len: palette.len() });
        }

        let expected = (width * height) as usize;
        if pixels.len() != expected {
            return Err(ConfigError::PixelBufferSize { len: pixels.len(), expected });
        }
        if let Some((offset, &index)) = pixels.iter().enumerate().find(|&(_, &i)| i as usize >= palette.len()) {
            return Err(ConfigError::PixelIndexOutOfRange { offset, index, len: palette.len() });
        }

        Ok(Self { width, height, pixels, palette, color_key })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &'a [u8] {
        self.pixels
    }

    pub fn palette(&self) -> &'a [u16] {
        self.palette
    }

    pub fn color_key(&self) -> u8 {
        self.color_key
    }

    /// The transparent colour.
    pub fn key_color(&self) -> u16 {
        self.palette[self.color_key as usize]
    }

    /// Palette-resolved colour of a source pixel.
    pub fn color_at(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = self.pixels[(y * self.width + x) as usize];
        Some(self.palette[index as usize])
    }
}

/// Destination pixels, row-major RGB565.
#[derive(Debug)]
pub struct Surface<'a> {
    pixels: &'a mut [u16],
    width: u32,
    height: u32,
}

impl<'a> Surface<'a> {
    pub fn new(pixels: &'a mut [u16], width: u32, height: u32) -> Result<Self, ConfigError> {
        let expected = (width as usize) * (height as usize);
        if pixels.len() != expected {
            return Err(ConfigError::SurfaceSize { len: pixels.len(), expected });
        }
        Ok(Self { pixels, width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[(y * self.width + x) as usize])
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels[..]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u16] {
        let start = (y * self.width) as usize;
        &mut self.pixels[start..start + self.width as usize]
    }
}
