use alloc::boxed::Box;
use alloc::vec;

use log::debug;

use crate::bus::SCRATCH_BASE;
use crate::clip::ClipState;
use crate::sprite::Surface;

pub const SQUARE_SIDES: [u32; 7] = [4, 8, 16, 24, 32, 48, 64];
pub const BUFFER_COUNT: usize = SQUARE_SIDES.len() + 1;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ScratchId(usize);

impl ScratchId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Placement of one buffer inside the pool, in pixels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ScratchLayout {
    pub offset: usize,
    pub width: u32,
    pub height: u32,
}

impl ScratchLayout {
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Staging buffers, allocated once and laid out back to back at
/// [`SCRATCH_BASE`]: the squares first, the full-screen buffer last.
#[derive(Debug)]
pub struct ScratchPool {
    storage: Box<[u16]>,
    layouts: [ScratchLayout; BUFFER_COUNT],
}

impl ScratchPool {
    pub fn new(display_width: u32, display_height: u32, margin: u32) -> Self {
        let mut layouts = [ScratchLayout::default(); BUFFER_COUNT];
        let mut offset = 0;
        for (layout, &side) in layouts.iter_mut().zip(SQUARE_SIDES.iter()) {
            *layout = ScratchLayout { offset, width: side, height: side };
            offset += layout.len();
        }
        layouts[BUFFER_COUNT - 1] = ScratchLayout {
            offset,
            width: display_width + margin,
            height: display_height + margin,
        };
        offset += layouts[BUFFER_COUNT - 1].len();

        debug!(target: "scratch", "scratch pool of {} pixels", offset);
        Self {
            storage: vec![0u16; offset].into_boxed_slice(),
            layouts,
        }
    }

    /// Smallest buffer holding `width` x `height`.
    pub fn select(&self, width: u32, height: u32) -> Option<ScratchId> {
        self.layouts
            .iter()
            .position(|l| l.width >= width && l.height >= height)
            .map(ScratchId)
    }

    pub fn layout(&self, id: ScratchId) -> ScratchLayout {
        self.layouts[id.0]
    }

    /// Bus address of the first pixel.
    pub fn address(&self, id: ScratchId) -> u32 {
        SCRATCH_BASE + (self.layouts[id.0].offset * 2) as u32
    }

    /// Row stride in bytes.
    pub fn stride(&self, id: ScratchId) -> u32 {
        self.layouts[id.0].width * 2
    }

    pub fn clear(&mut self, id: ScratchId, color: u16) {
        let layout = self.layouts[id.0];
        self.storage[layout.offset..layout.offset + layout.len()].fill(color);
    }

    pub fn view(&self, id: ScratchId) -> &[u16] {
        let layout = self.layouts[id.0];
        &self.storage[layout.offset..layout.offset + layout.len()]
    }

    pub fn storage_mut(&mut self) -> &mut [u16] {
        &mut self.storage
    }

    /// Copies the visible part of buffer `id` into `target`, leaving pixels
    /// equal to `key` untouched.
    pub fn composite(&self, id: ScratchId, clip: &ClipState, key: u16, target: &mut Surface) {
        let layout = self.layouts[id.0];
        let buffer = self.view(id);
        let width = clip.visible_width as usize;

        for row in 0..clip.visible_height {
            let start = row as usize * layout.width as usize + clip.lead_pixels as usize;
            let source = &buffer[start..start + width];
            let dest_row = target.row_mut(clip.dst_y + row);
            let dest = &mut dest_row[clip.dst_x as usize..clip.dst_x as usize + width];
            for (d, &s) in dest.iter_mut().zip(source) {
                if s != key {
                    *d = s;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Scale;

    #[test]
    fn selects_the_smallest_fit() {
        let pool = ScratchPool::new(96, 64, 128);
        assert_eq!(pool.layout(pool.select(16, 16).unwrap()).width, 16);
        assert_eq!(pool.layout(pool.select(17, 3).unwrap()).width, 24);
        assert_eq!(pool.layout(pool.select(1, 1).unwrap()).width, 4);
        let full = pool.layout(pool.select(65, 10).unwrap());
        assert_eq!((full.width, full.height), (224, 192));
        assert_eq!(pool.select(225, 1), None);
    }

    #[test]
    fn buffers_do_not_overlap() {
        let pool = ScratchPool::new(96, 64, 128);
        let mut end = 0;
        for index in 0..BUFFER_COUNT {
            let layout = pool.layout(ScratchId(index));
            assert_eq!(layout.offset, end);
            end += layout.len();
        }
        assert_eq!(pool.address(ScratchId(1)), SCRATCH_BASE + 32);
    }

    #[test]
    fn composite_skips_key_pixels() {
        let mut pool = ScratchPool::new(8, 8, 0);
        let id = pool.select(4, 4).unwrap();
        pool.clear(id, 0xf81f);
        let offset = pool.layout(id).offset;
        pool.storage_mut()[offset + 1] = 0x1234;
        pool.storage_mut()[offset + 4 + 2] = 0x4321;

        let clip = ClipState::compute(16, Scale::ONE, Scale::ONE, 2, 3, 8, 8).unwrap();
        let clip = ClipState { visible_width: 3, visible_height: 2, ..clip };

        let mut pixels = [0u16; 64];
        let mut surface = Surface::new(&mut pixels, 8, 8).unwrap();
        pool.composite(id, &clip, 0xf81f, &mut surface);

        assert_eq!(surface.pixel(3, 3), Some(0x1234));
        assert_eq!(surface.pixel(4, 4), Some(0x4321));
        assert_eq!(surface.pixels().iter().filter(|&&p| p != 0).count(), 2);
    }
}
