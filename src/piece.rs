//! Active falling piece logic

use crate::board::Board;
use crate::kick::wall_kicks;
use crate::tetromino::{Rotation, TetrominoType, BOX_SIZE};

/// Column of the occupancy box's left edge at spawn
pub const SPAWN_COL: i32 = 3;
/// Row of the occupancy box's top edge at spawn
pub const SPAWN_ROW: i32 = 0;

/// An active falling piece
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    /// The type of tetromino
    pub piece_type: TetrominoType,
    /// Current rotation state
    pub rotation: Rotation,
    /// Board position (row, col) of the occupancy box's top-left corner
    /// Row 0 is the top of the board, increases downward
    pub row: i32,
    pub col: i32,
}

impl Piece {
    /// Create a new piece at spawn position
    pub fn new(piece_type: TetrominoType) -> Self {
        Self {
            piece_type,
            rotation: Rotation::North,
            row: SPAWN_ROW,
            col: SPAWN_COL,
        }
    }

    /// The 4x4 occupancy grid for the current rotation
    pub fn grid(&self) -> [[bool; BOX_SIZE]; BOX_SIZE] {
        self.piece_type.occupancy(self.rotation)
    }

    /// Get the absolute (row, col) positions of all 4 blocks
    pub fn blocks(&self) -> [(i32, i32); 4] {
        self.piece_type
            .cells(self.rotation)
            .map(|(r, c)| (self.row + r as i32, self.col + c as i32))
    }

    /// True if any block is out of bounds or overlaps a filled cell
    pub fn collides(&self, board: &Board) -> bool {
        self.blocks()
            .iter()
            .any(|&(row, col)| !board.is_free(row, col))
    }

    /// Try to shift by `dcol` columns, returns true if successful
    pub fn shift(&mut self, dcol: i32, board: &Board) -> bool {
        self.col += dcol;
        if self.collides(board) {
            self.col -= dcol;
            false
        } else {
            true
        }
    }

    pub fn move_left(&mut self, board: &Board) -> bool {
        self.shift(-1, board)
    }

    pub fn move_right(&mut self, board: &Board) -> bool {
        self.shift(1, board)
    }

    /// Try to move down one row, returns true if successful
    pub fn move_down(&mut self, board: &Board) -> bool {
        self.row += 1;
        if self.collides(board) {
            self.row -= 1;
            false
        } else {
            true
        }
    }

    /// Rotate clockwise, trying each wall kick in order
    ///
    /// If every candidate collides the piece keeps its previous state.
    pub fn rotate(&mut self, board: &Board) -> bool {
        let original_col = self.col;
        let original_rotation = self.rotation;
        self.rotation = original_rotation.cw();

        for &kick in wall_kicks(self.piece_type) {
            self.col = original_col + kick;
            if !self.collides(board) {
                return true;
            }
        }

        // Restore original state
        self.col = original_col;
        self.rotation = original_rotation;
        false
    }

    /// Row the piece would come to rest on if dropped straight down
    pub fn ghost_row(&self, board: &Board) -> i32 {
        let mut probe = self.clone();
        while probe.move_down(board) {}
        probe.row
    }

    /// Copy of this piece at its landing position
    pub fn ghost(&self, board: &Board) -> Piece {
        Piece {
            row: self.ghost_row(board),
            ..self.clone()
        }
    }

    /// Hard drop - move down as far as possible and return distance dropped
    pub fn hard_drop(&mut self, board: &Board) -> u32 {
        let landing = self.ghost_row(board);
        let distance = (landing - self.row).max(0) as u32;
        self.row = landing;
        distance
    }
}
