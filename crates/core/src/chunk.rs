//! Render-culling chunks: fixed squares precomputed once per map.

/// Inclusive-exclusive tile rectangle `[x0, x1) x [y0, y1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Chunk {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

/// Pixel-space camera rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkIndex {
    size: usize,
    cols: usize,
    rows: usize,
    chunks: Vec<Chunk>,
}

impl ChunkIndex {
    pub fn new(width: usize, height: usize, size: usize) -> Self {
        let size = size.max(1);
        let cols = width.div_ceil(size);
        let rows = height.div_ceil(size);
        let mut chunks = Vec::with_capacity(cols * rows);
        for row in 0..rows {
            for col in 0..cols {
                chunks.push(Chunk {
                    x0: col * size,
                    y0: row * size,
                    x1: ((col + 1) * size).min(width),
                    y1: ((row + 1) * size).min(height),
                });
            }
        }
        Self { size, cols, rows, chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Chunks overlapping `viewport`, row-major.
    pub fn visible(&self, viewport: Viewport, tile_size_px: f32) -> Vec<Chunk> {
        if self.chunks.is_empty()
            || viewport.width <= 0.0
            || viewport.height <= 0.0
            || tile_size_px <= 0.0
        {
            return Vec::new();
        }
        let span = self.size as f32 * tile_size_px;
        let to_range = |start: f32, extent: f32, limit: usize| -> Option<(usize, usize)> {
            let first = (start / span).floor();
            let last = ((start + extent) / span).ceil() - 1.0;
            if last < 0.0 || first >= limit as f32 {
                return None;
            }
            Some((first.max(0.0) as usize, (last as usize).min(limit - 1)))
        };
        let columns = to_range(viewport.x, viewport.width, self.cols);
        let rows = to_range(viewport.y, viewport.height, self.rows);
        let (Some((c0, c1)), Some((r0, r1))) = (columns, rows) else {
            return Vec::new();
        };
        let mut visible = Vec::with_capacity((c1 - c0 + 1) * (r1 - r0 + 1));
        for row in r0..=r1 {
            for col in c0..=c1 {
                visible.push(self.chunks[row * self.cols + col]);
            }
        }
        visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_tile_the_map_exactly() {
        let index = ChunkIndex::new(50, 20, 16);
        assert_eq!(index.len(), 4 * 2);
        let area: usize = index.chunks().iter().map(|c| (c.x1 - c.x0) * (c.y1 - c.y0)).sum();
        assert_eq!(area, 50 * 20);
    }

    #[test]
    fn viewport_selects_overlapping_chunks() {
        let index = ChunkIndex::new(64, 64, 16);
        let view = Viewport { x: 600.0, y: 10.0, width: 100.0, height: 500.0 };
        let visible = index.visible(view, 32.0);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0], Chunk { x0: 16, y0: 0, x1: 32, y1: 16 });

        let wide = Viewport { x: 500.0, y: 0.0, width: 100.0, height: 600.0 };
        assert_eq!(index.visible(wide, 32.0).len(), 2 * 2);
    }

    #[test]
    fn viewport_outside_the_map_sees_nothing() {
        let index = ChunkIndex::new(32, 32, 16);
        let off = Viewport { x: -500.0, y: -500.0, width: 100.0, height: 100.0 };
        assert!(index.visible(off, 32.0).is_empty());
        let beyond = Viewport { x: 5_000.0, y: 0.0, width: 10.0, height: 10.0 };
        assert!(index.visible(beyond, 32.0).is_empty());
    }
}
