// Shuffled number grid for one trial

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

/// Cell coordinates in the grid (column, row)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridPosition {
    pub x: u32,
    pub y: u32,
}

/// Numbers `1..=total` placed in a `cols`-wide grid in random order
#[derive(Debug, Clone, PartialEq)]
pub struct GridLayout {
    cells: Vec<u32>,
    cols: u32,
}

impl GridLayout {
    /// Shuffle a fresh layout with the thread RNG
    pub fn shuffled(total: u32, cols: u32) -> Self {
        Self::shuffled_with(total, cols, &mut rand::rng())
    }

    /// Shuffle with a caller-provided RNG (seeded in tests)
    pub fn shuffled_with<R: Rng + ?Sized>(total: u32, cols: u32, rng: &mut R) -> Self {
        let mut cells: Vec<u32> = (1..=total.max(1)).collect();
        cells.shuffle(rng);
        Self {
            cells,
            cols: cols.max(1),
        }
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn rows(&self) -> u32 {
        (self.cells.len() as u32).div_ceil(self.cols)
    }

    /// Numbers in row-major order
    pub fn cells(&self) -> &[u32] {
        &self.cells
    }

    /// Where a number sits in the grid
    pub fn position_of(&self, number: u32) -> Option<GridPosition> {
        self.cells
            .iter()
            .position(|&n| n == number)
            .map(|i| GridPosition {
                x: i as u32 % self.cols,
                y: i as u32 / self.cols,
            })
    }
}
