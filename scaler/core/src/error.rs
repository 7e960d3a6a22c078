/// Mismatch between assets, destination and engine capability. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported sprite size {width}x{height}, expected 16x16 or 32x32")]
    UnsupportedSize { width: u32, height: u32 },
    #[error("palette is empty")]
    EmptyPalette,
    #[error("palette has {len} entries, at most {max} are addressable")]
    PaletteTooLarge { len: usize, max: usize },
    #[error("color key {key} is outside a palette of {len} entries")]
    ColorKeyOutOfRange { key: u8, len: usize },
    #[error("pixel {offset} uses palette index {index}, palette has {len} entries")]
    PixelIndexOutOfRange { offset: usize, index: u8, len: usize },
    #[error("pixel buffer holds {len} entries, expected {expected}")]
    PixelBufferSize { len: usize, expected: usize },
    #[error("destination buffer holds {len} pixels, expected {expected}")]
    SurfaceSize { len: usize, expected: usize },
    #[error("no scratch buffer fits {width}x{height}")]
    NoScratchBuffer { width: u32, height: u32 },
    #[error("address list is full at {rows} rows")]
    AddressListFull { rows: usize },
    #[error("display {width}x{height} exceeds the engine limits")]
    DisplayTooLarge { width: u32, height: u32 },
    #[error("no fixed point format for stride {stride} over {rows} rows in a {accum_bits}-bit accumulator")]
    FixedPointOverflow { stride: u32, rows: u32, accum_bits: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScalerError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("hardware did not finish within {iterations} poll iterations")]
    HardwareHang { iterations: u32 },
}
