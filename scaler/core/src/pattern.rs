//! Scale factors and their 8-slot repetition patterns.
//!
//! A scale is held as a count of eighths. Slot `i` of a pattern is how many
//! output pixels source column `c` produces when `c % 8 == i`; the slots of
//! scale `k/8` sum to `k`. The usable scales come in bands: eighths up to
//! 2.0, quarters up to 4.0, halves up to 6.0, then 7.0 and 8.0.

pub type ScalePattern = [u32; 8];

pub const MAX_EIGHTHS: u8 = 64;

/// Every snappable scale, in eighths, ascending.
pub const SCALE_TABLE: [u8; 30] = build_table();

/// Pattern for every scale `k` eighths at index `k - 1`. Patterns live in
/// static memory so the horizontal feeder can stream them in place.
pub static PATTERNS: [ScalePattern; MAX_EIGHTHS as usize] = build_patterns();

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Scale(u8);

impl Scale {
    pub const ONE: Scale = Scale(8);
    pub const MIN: Scale = Scale(1);
    pub const MAX: Scale = Scale(MAX_EIGHTHS);

    pub const fn from_eighths(eighths: u8) -> Option<Scale> {
        if eighths == 0 || eighths > MAX_EIGHTHS {
            None
        } else {
            Some(Scale(eighths))
        }
    }

    /// Nearest table entry, see [`find_closest_scale`].
    pub fn snap(x: f64) -> Scale {
        Scale(SCALE_TABLE[closest_index(x)])
    }

    pub const fn eighths(self) -> u32 {
        self.0 as u32
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 8.0
    }

    /// Output pixels produced by `columns` source columns starting at slot 0.
    pub const fn output_len(self, columns: u32) -> u32 {
        (columns * self.0 as u32 + 7) / 8
    }

    /// Source columns needed so that `output_len` reaches `pixels`.
    pub const fn columns_for(self, pixels: u32) -> u32 {
        if pixels == 0 {
            return 0;
        }
        (pixels - 1) * 8 / self.0 as u32 + 1
    }
}

const fn build_table() -> [u8; 30] {
    let mut table = [0u8; 30];
    let mut n = 0;
    let mut k = 1;
    while k <= 64 {
        let step = if k <= 16 {
            1
        } else if k <= 32 {
            2
        } else if k <= 48 {
            4
        } else {
            8
        };
        if k % step == 0 {
            table[n] = k;
            n += 1;
        }
        k += 1;
    }
    table
}

const fn build_pattern(eighths: u32) -> ScalePattern {
    let mut pattern = [0u32; 8];
    let mut i = 0;
    while i < 8 {
        let end = ((i as u32 + 1) * eighths + 7) / 8;
        let start = (i as u32 * eighths + 7) / 8;
        pattern[i] = end - start;
        i += 1;
    }
    pattern
}

const fn build_patterns() -> [ScalePattern; MAX_EIGHTHS as usize] {
    let mut patterns = [[0u32; 8]; MAX_EIGHTHS as usize];
    let mut k = 0;
    while k < MAX_EIGHTHS as usize {
        patterns[k] = build_pattern(k as u32 + 1);
        k += 1;
    }
    patterns
}

/// Ten-thousandths per eighth. Every midpoint between two table entries is a
/// whole number of ten-thousandths, so truncating to four decimals never
/// moves an input across one.
const UNITS_PER_EIGHTH: i64 = 1250;

fn closest_index(x: f64) -> usize {
    if x.is_nan() {
        return closest_index(1.0);
    }

    // truncate toward zero, saturating on overflow
    let t = (x * 10_000.0) as i64;
    let units = |i: usize| SCALE_TABLE[i] as i64 * UNITS_PER_EIGHTH;

    let last = SCALE_TABLE.len() - 1;
    if t <= units(0) {
        return 0;
    }
    if t >= units(last) {
        return last;
    }

    // first entry >= t
    let upper = SCALE_TABLE.partition_point(|&k| (k as i64 * UNITS_PER_EIGHTH) < t);
    let lower = upper - 1;
    // ties go up: when the truncated value sits on the midpoint the input is
    // at or above it
    if t - units(lower) < units(upper) - t { lower } else { upper }
}

/// Snaps `x` to the nearest usable scale.
///
/// Inputs outside the table clamp to its ends; NaN snaps to 1.0.
pub fn find_closest_scale(x: f64) -> f64 {
    Scale::snap(x).as_f64()
}

/// Pattern for the scale nearest to `scale`.
pub fn get_pattern(scale: f64) -> &'static ScalePattern {
    pattern_for(Scale::snap(scale))
}

pub fn pattern_for(scale: Scale) -> &'static ScalePattern {
    &PATTERNS[scale.0 as usize - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_bands() {
        assert_eq!(SCALE_TABLE[0], 1);
        assert_eq!(SCALE_TABLE[15], 16);
        assert_eq!(SCALE_TABLE[16], 18);
        assert_eq!(SCALE_TABLE[23], 32);
        assert_eq!(&SCALE_TABLE[24..], &[36, 40, 44, 48, 56, 64]);
        assert!(SCALE_TABLE.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn integer_scales_repeat() {
        assert_eq!(get_pattern(1.0), &[1; 8]);
        assert_eq!(get_pattern(3.0), &[3; 8]);
        assert_eq!(get_pattern(8.0), &[8; 8]);
    }

    #[test]
    fn fractional_scales_spread_evenly() {
        assert_eq!(get_pattern(1.5), &[2, 1, 2, 1, 2, 1, 2, 1]);
        assert_eq!(get_pattern(0.5), &[1, 0, 1, 0, 1, 0, 1, 0]);
        assert_eq!(get_pattern(0.125), &[1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(get_pattern(2.25), &[3, 2, 2, 2, 3, 2, 2, 2]);
    }

    #[test]
    fn snapping() {
        assert_eq!(find_closest_scale(1.0), 1.0);
        assert_eq!(find_closest_scale(1.06), 1.0);
        assert_eq!(find_closest_scale(1.07), 1.125);
        // exact midpoint between 1.0 and 1.125
        assert_eq!(find_closest_scale(1.0625), 1.125);
        assert_eq!(find_closest_scale(6.4), 6.0);
        assert_eq!(find_closest_scale(6.6), 7.0);
        assert_eq!(find_closest_scale(-3.0), 0.125);
        assert_eq!(find_closest_scale(0.0), 0.125);
        assert_eq!(find_closest_scale(100.0), 8.0);
        assert_eq!(find_closest_scale(f64::INFINITY), 8.0);
        assert_eq!(find_closest_scale(f64::NAN), 1.0);
    }

    #[test]
    fn output_lengths_follow_the_pattern() {
        for k in 1..=MAX_EIGHTHS {
            let scale = Scale::from_eighths(k).unwrap();
            let pattern = pattern_for(scale);
            let mut total = 0;
            for columns in 0..=32u32 {
                assert_eq!(scale.output_len(columns), total);
                total += pattern[columns as usize % 8];
            }
            for pixels in 1..=64u32 {
                let columns = scale.columns_for(pixels);
                assert!(scale.output_len(columns) >= pixels);
                assert!(scale.output_len(columns - 1) < pixels);
            }
        }
    }
}
