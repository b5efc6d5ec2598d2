//! Pixel and grid coordinate value types.

use serde::{Deserialize, Serialize};

/// A point in pixels on the page. Used for click/drag input.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A cell on the board grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Location {
    pub col: i32,
    pub row: i32,
}

impl Location {
    pub fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }

    /// Grid indices for this location, if both coordinates are non-negative.
    pub fn indices(&self) -> Option<(usize, usize)> {
        let col = usize::try_from(self.col).ok()?;
        let row = usize::try_from(self.row).ok()?;
        Some((col, row))
    }
}

/// Distance by the tabletop metric: diagonal steps cost the same as straight ones.
pub fn tile_distance(a: Location, b: Location) -> u32 {
    a.col.abs_diff(b.col).max(a.row.abs_diff(b.row))
}

/// The mathematical `n mod m`, always in `[0, m)`.
///
/// Returns `None` when `m < 1`.
pub fn modulo(n: i64, m: i64) -> Option<i64> {
    if m < 1 {
        return None;
    }
    Some(n.rem_euclid(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_distance_is_chebyshev() {
        let a = Location::new(1, 1);
        assert_eq!(tile_distance(a, Location::new(4, 2)), 3);
        assert_eq!(tile_distance(a, Location::new(-1, 5)), 4);
        assert_eq!(tile_distance(a, a), 0);
    }

    #[test]
    fn test_modulo_positive_smaller_than_m() {
        assert_eq!(modulo(2, 5), Some(2));
    }

    #[test]
    fn test_modulo_negative_n() {
        assert_eq!(modulo(-2, 5), Some(3));
    }

    #[test]
    fn test_modulo_n_equal_m() {
        assert_eq!(modulo(5, 5), Some(0));
    }

    #[test]
    fn test_modulo_illegal_m() {
        assert_eq!(modulo(5, 0), None);
        assert_eq!(modulo(5, -3), None);
    }

    #[test]
    fn test_location_indices() {
        assert_eq!(Location::new(2, 3).indices(), Some((2, 3)));
        assert_eq!(Location::new(-1, 3).indices(), None);
    }

    #[test]
    fn test_location_wire_format() {
        let json = serde_json::to_string(&Location::new(7, 1)).unwrap();
        assert_eq!(json, r#"{"col":7,"row":1}"#);
    }
}
