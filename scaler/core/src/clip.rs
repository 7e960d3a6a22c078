use crate::bus::SPRITE_BASE;
use crate::pattern::Scale;

/// Where a draw lands and which part of the sprite the hardware renders.
///
/// Negative positions skip whole source rows and columns. Column skips are
/// split in two: multiples of eight are skipped by moving the source base
/// so the horizontal pattern stays in phase, the remaining
/// `lead_columns` are rendered and then dropped by the compositor as
/// `lead_pixels` output pixels.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ClipState {
    pub skip_rows: u32,
    pub skip_columns: u32,
    pub hw_skip_columns: u32,
    pub lead_columns: u32,
    pub lead_pixels: u32,
    pub source_base: u32,
    /// Source columns the chain renders per row, a multiple of eight.
    pub rendered_columns: u32,
    /// Output pixels per scratch row, `lead_pixels` included.
    pub rendered_width: u32,
    pub visible_width: u32,
    pub visible_height: u32,
    pub dst_x: u32,
    pub dst_y: u32,
}

const fn round_up_8(n: u32) -> u32 {
    (n + 7) & !7
}

impl ClipState {
    /// `None` when nothing of the sprite reaches the destination.
    pub fn compute(
        side: u32,
        h_scale: Scale,
        v_scale: Scale,
        x: i32,
        y: i32,
        dest_width: u32,
        dest_height: u32,
    ) -> Option<ClipState> {
        let skip_columns = (-(x as i64)).max(0);
        let skip_rows = (-(y as i64)).max(0);
        if skip_columns >= side as i64 || skip_rows >= side as i64 {
            return None;
        }
        let (skip_columns, skip_rows) = (skip_columns as u32, skip_rows as u32);

        let dst_x = x.max(0) as u32;
        let dst_y = y.max(0) as u32;
        if dst_x >= dest_width || dst_y >= dest_height {
            return None;
        }

        let hw_skip_columns = skip_columns & !7;
        let lead_columns = skip_columns - hw_skip_columns;
        let lead_pixels = h_scale.output_len(lead_columns);

        let available = side - hw_skip_columns;
        let full_width = h_scale.output_len(available);
        let visible_width = full_width.saturating_sub(lead_pixels).min(dest_width - dst_x);
        let visible_height = v_scale.output_len(side - skip_rows).min(dest_height - dst_y);
        if visible_width == 0 || visible_height == 0 {
            return None;
        }

        let rendered_columns = round_up_8(h_scale.columns_for(lead_pixels + visible_width)).min(available);
        let rendered_width = h_scale.output_len(rendered_columns);

        Some(ClipState {
            skip_rows,
            skip_columns,
            hw_skip_columns,
            lead_columns,
            lead_pixels,
            source_base: SPRITE_BASE + skip_rows * side + hw_skip_columns,
            rendered_columns,
            rendered_width,
            visible_width,
            visible_height,
            dst_x,
            dst_y,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale(eighths: u8) -> Scale {
        Scale::from_eighths(eighths).unwrap()
    }

    #[test]
    fn fully_visible() {
        let clip = ClipState::compute(16, Scale::ONE, Scale::ONE, 10, 10, 96, 64).unwrap();
        assert_eq!((clip.dst_x, clip.dst_y), (10, 10));
        assert_eq!((clip.visible_width, clip.visible_height), (16, 16));
        assert_eq!(clip.rendered_columns, 16);
        assert_eq!(clip.lead_pixels, 0);
        assert_eq!(clip.source_base, SPRITE_BASE);
    }

    #[test]
    fn negative_x_splits_the_skip() {
        let clip = ClipState::compute(16, scale(16), Scale::ONE, -5, 0, 96, 64).unwrap();
        assert_eq!(clip.hw_skip_columns, 0);
        assert_eq!(clip.lead_columns, 5);
        assert_eq!(clip.lead_pixels, 10);
        assert_eq!(clip.visible_width, 22);
        assert_eq!(clip.rendered_columns, 16);

        let clip = ClipState::compute(32, Scale::ONE, Scale::ONE, -13, -3, 96, 64).unwrap();
        assert_eq!(clip.hw_skip_columns, 8);
        assert_eq!(clip.lead_columns, 5);
        assert_eq!(clip.visible_width, 19);
        assert_eq!(clip.visible_height, 29);
        assert_eq!(clip.source_base, SPRITE_BASE + 3 * 32 + 8);
        assert_eq!(clip.rendered_columns, 24);
    }

    #[test]
    fn right_edge_limits_the_rendered_columns() {
        let clip = ClipState::compute(32, scale(64), scale(64), 90, 60, 96, 64).unwrap();
        assert_eq!((clip.visible_width, clip.visible_height), (6, 4));
        assert_eq!(clip.rendered_columns, 8);
        assert_eq!(clip.rendered_width, 64);
    }

    #[test]
    fn empty_areas() {
        assert!(ClipState::compute(16, Scale::ONE, Scale::ONE, -16, 0, 96, 64).is_none());
        assert!(ClipState::compute(16, Scale::ONE, Scale::ONE, 0, -40, 96, 64).is_none());
        assert!(ClipState::compute(16, Scale::ONE, Scale::ONE, 96, 0, 96, 64).is_none());
        assert!(ClipState::compute(16, Scale::ONE, Scale::ONE, 0, 64, 96, 64).is_none());
        assert!(ClipState::compute(16, Scale::ONE, Scale::ONE, i32::MIN, 0, 96, 64).is_none());
        // the only remaining column produces no output at 1/8 scale
        assert!(ClipState::compute(16, Scale::MIN, Scale::ONE, -15, 0, 96, 64).is_none());
    }
}
