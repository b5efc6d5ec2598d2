//! Column-major cell grids and the pixel-to-grid sizing math.

use serde::{Deserialize, Serialize};

use crate::coordinates::{Location, Point};

/// Largest number of columns or rows a board may have.
pub const MAX_GRID_AXIS: u32 = 4096;

/// Largest number of cells a board may have.
pub const MAX_GRID_CELLS: u64 = 1 << 20;

/// Number of columns and rows of a board grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GridSize {
    pub cols: u32,
    pub rows: u32,
}

impl GridSize {
    pub fn new(cols: u32, rows: u32) -> Self {
        Self { cols, rows }
    }

    pub fn cell_count(&self) -> u64 {
        u64::from(self.cols) * u64::from(self.rows)
    }

    /// True when a grid of this size may be allocated.
    pub fn is_within_limits(&self) -> bool {
        self.cols <= MAX_GRID_AXIS && self.rows <= MAX_GRID_AXIS && self.cell_count() <= MAX_GRID_CELLS
    }

    pub fn contains(&self, location: Location) -> bool {
        match location.indices() {
            Some((col, row)) => col < self.cols as usize && row < self.rows as usize,
            None => false,
        }
    }
}

/// A `cols × rows` grid, indexed `[col][row]`.
///
/// Serialized transparently as an array of columns so stored boards and wire
/// payloads keep the `grid[col][row]` layout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid<T> {
    columns: Vec<Vec<T>>,
}

impl<T: Clone> Grid<T> {
    /// Create a grid with every cell set to `fill`.
    pub fn new(cols: u32, rows: u32, fill: T) -> Self {
        Self {
            columns: vec![vec![fill; rows as usize]; cols as usize],
        }
    }

    /// Copy of this grid with the given dimensions.
    ///
    /// Cells inside both the old and the new bounds keep their value; new
    /// cells are set to `fill`.
    pub fn resized(&self, cols: u32, rows: u32, fill: T) -> Self {
        let mut result = Self::new(cols, rows, fill);
        for (col, column) in result.columns.iter_mut().enumerate() {
            let Some(old) = self.columns.get(col) else {
                continue;
            };
            for (row, cell) in column.iter_mut().enumerate() {
                if let Some(value) = old.get(row) {
                    *cell = value.clone();
                }
            }
        }
        result
    }
}

impl<T> Grid<T> {
    /// Wrap raw columns. The shape is not checked; see [`Grid::has_shape`].
    pub fn from_columns(columns: Vec<Vec<T>>) -> Self {
        Self { columns }
    }

    pub fn cols(&self) -> u32 {
        self.columns.len() as u32
    }

    /// Row count of the first column (0 for an empty grid).
    pub fn rows(&self) -> u32 {
        self.columns.first().map_or(0, |c| c.len() as u32)
    }

    pub fn size(&self) -> GridSize {
        GridSize::new(self.cols(), self.rows())
    }

    /// Whether this is a rectangular `cols × rows` grid.
    pub fn has_shape(&self, cols: u32, rows: u32) -> bool {
        self.columns.len() == cols as usize
            && self.columns.iter().all(|c| c.len() == rows as usize)
    }

    pub fn get(&self, location: Location) -> Option<&T> {
        let (col, row) = location.indices()?;
        self.columns.get(col)?.get(row)
    }

    /// Overwrite one cell. Returns `false` if the location is out of bounds.
    pub fn set(&mut self, location: Location, value: T) -> bool {
        let Some((col, row)) = location.indices() else {
            return false;
        };
        match self.columns.get_mut(col).and_then(|c| c.get_mut(row)) {
            Some(cell) => {
                *cell = value;
                true
            }
            None => false,
        }
    }

    /// All cells in column-major order.
    pub fn cells(&self) -> impl Iterator<Item = (Location, &T)> {
        self.columns.iter().enumerate().flat_map(|(col, column)| {
            column
                .iter()
                .enumerate()
                .map(move |(row, value)| (Location::new(col as i32, row as i32), value))
        })
    }

    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> Grid<U> {
        Grid {
            columns: self
                .columns
                .iter()
                .map(|column| column.iter().map(&f).collect())
                .collect(),
        }
    }
}

/// Compute grid dimensions for a background of `width × height` pixels.
///
/// The offset is taken modulo the tile size; a non-zero offset adds a partial
/// column (row) at the leading edge. Returns `None` for a zero tile size or
/// when the grid would exceed [`MAX_GRID_CELLS`].
pub fn grid_dimensions(width: u32, height: u32, tile_size: u32, offset: Point) -> Option<GridSize> {
    if tile_size == 0 {
        return None;
    }
    let tile = f64::from(tile_size);
    let size = GridSize::new(
        axis_cells(f64::from(width), tile, offset.x),
        axis_cells(f64::from(height), tile, offset.y),
    );
    size.is_within_limits().then_some(size)
}

fn axis_cells(length: f64, tile: f64, offset: f64) -> u32 {
    let offset = offset.rem_euclid(tile);
    if offset == 0.0 {
        (length / tile).ceil() as u32
    } else {
        1 + ((length - offset).max(0.0) / tile).ceil() as u32
    }
}

/// An inclusive rectangle of cells. Corners may be given in any order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleArea {
    pub start: Location,
    pub end: Location,
}

impl SimpleArea {
    pub fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }

    /// Every cell inside the area.
    pub fn tiles(&self) -> Vec<Location> {
        let (min_col, max_col) = ordered(self.start.col, self.end.col);
        let (min_row, max_row) = ordered(self.start.row, self.end.row);
        (min_col..=max_col)
            .flat_map(|col| (min_row..=max_row).map(move |row| Location::new(col, row)))
            .collect()
    }
}

fn ordered(a: i32, b: i32) -> (i32, i32) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Copy of `grid` with every cell of `area` set to `value`. Cells outside the
/// grid are ignored.
pub fn apply_area<T: Clone>(grid: &Grid<T>, area: &SimpleArea, value: T) -> Grid<T> {
    let mut result = grid.clone();
    for tile in area.tiles() {
        result.set(tile, value.clone());
    }
    result
}
