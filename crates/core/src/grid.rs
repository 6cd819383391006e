//! Column-major grid storage shared by tiles, flags, timers, and lava cells.
//!
//! Cells are laid out `[x][y]`: each column is one contiguous slice, so a range
//! of columns can be handed to a worker as a disjoint `&mut [T]`.

use rayon::prelude::*;

use crate::types::Tile;

#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T: Copy> Grid<T> {
    pub fn new(width: usize, height: usize, fill: T) -> Self {
        Self { width, height, cells: vec![fill; width * height] }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn index(&self, x: usize, y: usize) -> usize {
        x * self.height + y
    }

    /// Inverse of [`Grid::index`].
    pub fn position(&self, index: usize) -> (usize, usize) {
        (index / self.height, index % self.height)
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    pub fn is_border(&self, x: usize, y: usize) -> bool {
        x == 0 || y == 0 || x + 1 == self.width || y + 1 == self.height
    }

    pub fn get(&self, x: i32, y: i32) -> Option<T> {
        if !self.in_bounds(x, y) {
            return None;
        }
        Some(self.cells[self.index(x as usize, y as usize)])
    }

    pub fn at(&self, x: usize, y: usize) -> T {
        self.cells[self.index(x, y)]
    }

    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let idx = self.index(x, y);
        self.cells[idx] = value;
    }

    pub fn cells(&self) -> &[T] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [T] {
        &mut self.cells
    }

    pub fn column(&self, x: usize) -> &[T] {
        let start = x * self.height;
        &self.cells[start..start + self.height]
    }

    pub fn fill(&mut self, value: T) {
        self.cells.fill(value);
    }

    pub fn count(&self, mut predicate: impl FnMut(T) -> bool) -> usize {
        self.cells.iter().filter(|&&cell| predicate(cell)).count()
    }
}

impl<T: Copy + Send + Sync> Grid<T> {
    /// Splits the grid into disjoint bands of `band_width` columns, yielding the
    /// first column of each band with the band's cells.
    pub fn column_bands_mut(
        &mut self,
        band_width: usize,
    ) -> impl IndexedParallelIterator<Item = (usize, &mut [T])> {
        let band_width = band_width.max(1);
        let chunk_len = band_width * self.height.max(1);
        self.cells
            .par_chunks_mut(chunk_len)
            .enumerate()
            .map(move |(band, cells)| (band * band_width, cells))
    }
}

/// Read-only tile predicates consumed by pathfinding, physics, and rendering.
///
/// Off-map coordinates read as WALL: `is_solid_tile` answers `true` there and
/// every other predicate answers `false`, so the map edge behaves like an
/// implicit wall.
pub trait TileQuery {
    fn tile(&self, x: i32, y: i32) -> Option<Tile>;

    fn tile_value(&self, x: i32, y: i32) -> u8 {
        self.tile(x, y).map_or(Tile::Wall.code(), Tile::code)
    }

    fn is_solid_tile(&self, x: i32, y: i32) -> bool {
        self.tile(x, y).is_none_or(Tile::is_solid)
    }

    fn is_ladder_tile(&self, x: i32, y: i32) -> bool {
        self.tile(x, y) == Some(Tile::Ladder)
    }

    fn is_rope_tile(&self, x: i32, y: i32) -> bool {
        self.tile(x, y) == Some(Tile::Rope)
    }

    fn is_tile_empty(&self, x: i32, y: i32) -> bool {
        self.tile(x, y).is_some_and(Tile::is_empty)
    }

    fn is_lava_tile(&self, x: i32, y: i32) -> bool {
        self.tile(x, y) == Some(Tile::Lava)
    }
}

impl TileQuery for Grid<Tile> {
    fn tile(&self, x: i32, y: i32) -> Option<Tile> {
        self.get(x, y)
    }
}

/// Marks every cell within Chebyshev `radius` of a `true` cell in `source`.
pub fn dilate(source: &Grid<bool>, radius: usize) -> Grid<bool> {
    let width = source.width();
    let height = source.height();
    let mut out = Grid::new(width, height, false);
    for x in 0..width {
        for y in 0..height {
            if !source.at(x, y) {
                continue;
            }
            let x0 = x.saturating_sub(radius);
            let y0 = y.saturating_sub(radius);
            let x1 = (x + radius).min(width - 1);
            let y1 = (y + radius).min(height - 1);
            for nx in x0..=x1 {
                for ny in y0..=y1 {
                    out.set(nx, ny, true);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_is_column_major_and_invertible() {
        let grid = Grid::new(7, 5, 0_u8);
        assert_eq!(grid.index(0, 4), 4);
        assert_eq!(grid.index(1, 0), 5);
        for x in 0..7 {
            for y in 0..5 {
                assert_eq!(grid.position(grid.index(x, y)), (x, y));
            }
        }
    }

    #[test]
    fn column_bands_cover_every_column_once() {
        let mut grid = Grid::new(10, 4, 0_u32);
        grid.column_bands_mut(3).for_each(|(first_x, cells)| {
            for (offset, cell) in cells.iter_mut().enumerate() {
                *cell += (first_x + offset / 4) as u32 + 1;
            }
        });
        for x in 0..10 {
            for y in 0..4 {
                assert_eq!(grid.at(x, y), x as u32 + 1);
            }
        }
    }

    #[test]
    fn off_map_queries_read_as_wall() {
        let grid = Grid::new(4, 4, Tile::Empty);
        assert!(grid.is_solid_tile(-1, -1));
        assert!(grid.is_solid_tile(4, 0));
        assert!(!grid.is_tile_empty(-1, 2));
        assert!(!grid.is_ladder_tile(0, 9));
        assert_eq!(grid.tile_value(-3, 1), Tile::Wall.code());
        assert_eq!(grid.tile_value(1, 1), Tile::Empty.code());
    }

    #[test]
    fn dilate_spreads_by_radius_and_clamps_at_edges() {
        let mut seed = Grid::new(9, 9, false);
        seed.set(0, 0, true);
        seed.set(6, 6, true);
        let grown = dilate(&seed, 2);
        assert!(grown.at(2, 2));
        assert!(!grown.at(3, 0));
        assert!(grown.at(4, 8));
        assert!(grown.at(8, 4));
        assert!(!grown.at(3, 5));
    }
}
