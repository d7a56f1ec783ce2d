//! Tetromino definitions and occupancy masks
//!
//! Every shape lives in a 4x4 box. Each rotation state is a fixed list of
//! occupied `(row, col)` cells inside that box, looked up from a table rather
//! than computed by rotating a matrix.

use serde::{Deserialize, Serialize};

/// Side length of the occupancy box
pub const BOX_SIZE: usize = 4;

/// The 7 tetromino types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TetrominoType {
    I, // Cyan - long bar
    J, // Blue
    L, // Orange
    O, // Yellow - square
    S, // Green
    T, // Purple
    Z, // Red
}

impl TetrominoType {
    /// Get all tetromino types for bag randomization
    pub fn all() -> [TetrominoType; 7] {
        [
            TetrominoType::I,
            TetrominoType::J,
            TetrominoType::L,
            TetrominoType::O,
            TetrominoType::S,
            TetrominoType::T,
            TetrominoType::Z,
        ]
    }

    /// Palette index stored in board cells (0 is reserved for empty)
    pub fn color_index(&self) -> u8 {
        match self {
            TetrominoType::I => 1,
            TetrominoType::J => 2,
            TetrominoType::L => 3,
            TetrominoType::O => 4,
            TetrominoType::S => 5,
            TetrominoType::T => 6,
            TetrominoType::Z => 7,
        }
    }

    /// Occupied `(row, col)` cells inside the 4x4 box for a rotation state
    pub fn cells(&self, rotation: Rotation) -> [(usize, usize); 4] {
        let r = rotation.index();
        match self {
            TetrominoType::I => I_CELLS[r],
            TetrominoType::J => J_CELLS[r],
            TetrominoType::L => L_CELLS[r],
            TetrominoType::O => O_CELLS,
            TetrominoType::S => S_CELLS[r],
            TetrominoType::T => T_CELLS[r],
            TetrominoType::Z => Z_CELLS[r],
        }
    }

    /// Boolean occupancy grid for a rotation state
    pub fn occupancy(&self, rotation: Rotation) -> [[bool; BOX_SIZE]; BOX_SIZE] {
        let mut grid = [[false; BOX_SIZE]; BOX_SIZE];
        for (row, col) in self.cells(rotation) {
            grid[row][col] = true;
        }
        grid
    }

    pub fn name(&self) -> &'static str {
        match self {
            TetrominoType::I => "I",
            TetrominoType::J => "J",
            TetrominoType::L => "L",
            TetrominoType::O => "O",
            TetrominoType::S => "S",
            TetrominoType::T => "T",
            TetrominoType::Z => "Z",
        }
    }
}

// I: flat on row 1, then vertical in column 2, flat on row 2, vertical in column 1
const I_CELLS: [[(usize, usize); 4]; 4] = [
    [(1, 0), (1, 1), (1, 2), (1, 3)],
    [(0, 2), (1, 2), (2, 2), (3, 2)],
    [(2, 0), (2, 1), (2, 2), (2, 3)],
    [(0, 1), (1, 1), (2, 1), (3, 1)],
];

// J:  J..   .JJ   ...   .J.
//     JJJ   .J.   JJJ   .J.
//     ...   .J.   ..J   JJ.
const J_CELLS: [[(usize, usize); 4]; 4] = [
    [(0, 0), (1, 0), (1, 1), (1, 2)],
    [(0, 1), (0, 2), (1, 1), (2, 1)],
    [(1, 0), (1, 1), (1, 2), (2, 2)],
    [(0, 1), (1, 1), (2, 0), (2, 1)],
];

// L:  ..L   .L.   ...   LL.
//     LLL   .L.   LLL   .L.
//     ...   .LL   L..   .L.
const L_CELLS: [[(usize, usize); 4]; 4] = [
    [(0, 2), (1, 0), (1, 1), (1, 2)],
    [(0, 1), (1, 1), (2, 1), (2, 2)],
    [(1, 0), (1, 1), (1, 2), (2, 0)],
    [(0, 0), (0, 1), (1, 1), (2, 1)],
];

// O never changes
const O_CELLS: [(usize, usize); 4] = [(0, 1), (0, 2), (1, 1), (1, 2)];

// S:  .SS   .S.   ...   S..
//     SS.   .SS   .SS   SS.
//     ...   ..S   SS.   .S.
const S_CELLS: [[(usize, usize); 4]; 4] = [
    [(0, 1), (0, 2), (1, 0), (1, 1)],
    [(0, 1), (1, 1), (1, 2), (2, 2)],
    [(1, 1), (1, 2), (2, 0), (2, 1)],
    [(0, 0), (1, 0), (1, 1), (2, 1)],
];

// T:  .T.   .T.   ...   .T.
//     TTT   .TT   TTT   TT.
//     ...   .T.   .T.   .T.
const T_CELLS: [[(usize, usize); 4]; 4] = [
    [(0, 1), (1, 0), (1, 1), (1, 2)],
    [(0, 1), (1, 1), (1, 2), (2, 1)],
    [(1, 0), (1, 1), (1, 2), (2, 1)],
    [(0, 1), (1, 0), (1, 1), (2, 1)],
];

// Z:  ZZ.   ..Z   ...   .Z.
//     .ZZ   .ZZ   ZZ.   ZZ.
//     ...   .Z.   .ZZ   Z..
const Z_CELLS: [[(usize, usize); 4]; 4] = [
    [(0, 0), (0, 1), (1, 1), (1, 2)],
    [(0, 2), (1, 1), (1, 2), (2, 1)],
    [(1, 0), (1, 1), (2, 1), (2, 2)],
    [(0, 1), (1, 0), (1, 1), (2, 0)],
];

/// Rotation states (using SRS naming convention)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Rotation {
    #[default]
    North, // Spawn state
    East,  // Clockwise from North
    South, // 180 from North
    West,  // Counter-clockwise from North
}

impl Rotation {
    /// Rotate clockwise: North → East → South → West → North
    pub fn cw(&self) -> Rotation {
        match self {
            Rotation::North => Rotation::East,
            Rotation::East => Rotation::South,
            Rotation::South => Rotation::West,
            Rotation::West => Rotation::North,
        }
    }

    /// Rotation index 0-3, clockwise from spawn
    pub fn index(&self) -> usize {
        match self {
            Rotation::North => 0,
            Rotation::East => 1,
            Rotation::South => 2,
            Rotation::West => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROTATIONS: [Rotation; 4] = [
        Rotation::North,
        Rotation::East,
        Rotation::South,
        Rotation::West,
    ];

    #[test]
    fn test_every_state_has_four_cells() {
        for piece in TetrominoType::all() {
            for rotation in ROTATIONS {
                let grid = piece.occupancy(rotation);
                let count = grid.iter().flatten().filter(|&&c| c).count();
                assert_eq!(count, 4, "{} {:?}", piece.name(), rotation);
            }
        }
    }

    #[test]
    fn test_four_cw_turns_is_identity() {
        for rotation in ROTATIONS {
            assert_eq!(rotation.cw().cw().cw().cw(), rotation);
        }
    }

    #[test]
    fn test_o_piece_never_changes() {
        let spawn = TetrominoType::O.occupancy(Rotation::North);
        for rotation in ROTATIONS {
            assert_eq!(TetrominoType::O.occupancy(rotation), spawn);
        }
    }

    #[test]
    fn test_color_indices_are_distinct_and_nonzero() {
        let mut seen: Vec<u8> = TetrominoType::all().iter().map(|t| t.color_index()).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 7);
        assert!(!seen.contains(&0));
    }
}
