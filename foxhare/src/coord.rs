use serde_derive::{Deserialize, Serialize};

/// Integer position on the toroidal landscape.
///
/// Coordinates are allowed to leave the grid temporarily (movement offsets,
/// sprout jitter); every read or write into a layer goes through [`wrap`]
/// first, so there is no out-of-range failure mode.
#[derive(Copy, Clone, PartialEq, Eq, Default, Debug, Serialize, Deserialize)]
pub struct Coord {
    pub x: i16,
    pub y: i16,
}

impl Coord {
    pub fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

impl std::ops::Add for Coord {
    type Output = Coord;
    fn add(self, rhs: Coord) -> Coord {
        Coord {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

/// componentwise euclidean modulo into [0, dim)
pub fn wrap(v: i32, dim: usize) -> usize {
    v.rem_euclid(dim as i32) as usize
}
