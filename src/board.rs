//! Game board: placement grid, line clears, garbage and serialization

use crate::error::BoardImportError;
use crate::piece::Piece;
use crate::score::{attack_lines, Score};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

/// Standard board dimensions
pub const BOARD_WIDTH: usize = 10;
pub const VISIBLE_HEIGHT: usize = 20;
/// Hidden rows above the visible board for spawning and the death check
pub const BUFFER_HEIGHT: usize = 4;
pub const TOTAL_HEIGHT: usize = VISIBLE_HEIGHT + BUFFER_HEIGHT;

/// Number of characters in an exported board
pub const EXPORT_LEN: usize = BOARD_WIDTH * TOTAL_HEIGHT;

/// Empty cell value
pub const EMPTY: u8 = 0;
/// Palette index used for attack rows
pub const GARBAGE_COLOR: u8 = 8;
/// Highest palette index a cell may hold
pub const MAX_COLOR: u8 = GARBAGE_COLOR;

/// One row of cells, 0 = empty, otherwise a palette index
pub type Row = [u8; BOARD_WIDTH];
/// Full grid, row 0 at the top
pub type Grid = [Row; TOTAL_HEIGHT];

/// A row removed by a line clear, with its colors before clearing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearedRow {
    pub row: usize,
    pub cells: Row,
}

/// Result of merging a piece into the grid
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placement {
    /// Rows cleared by this placement, top to bottom
    pub cleared: Vec<ClearedRow>,
    /// Points awarded for the clear
    pub points: u64,
    /// Lines added to the outgoing attack queue
    pub attack: u32,
}

/// The game board
#[derive(Debug, Clone)]
pub struct Board {
    grid: Grid,
    /// Score, line counters and level
    pub score: Score,
    blocks_placed: u32,
    /// Lines owed to this board by opponents, not yet applied
    attacks_waiting: u32,
    /// Lines this board owes to every opponent, not yet sent
    outgoing_attack_queue: u32,
    /// Frames this board has been alive
    frame: u64,
    death_frame: Option<u64>,
    rng: ChaCha8Rng,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// Create a new empty board
    pub fn new() -> Self {
        Self::with_seed(rand::random())
    }

    /// Create a new empty board with a fixed garbage-hole seed
    pub fn with_seed(seed: u64) -> Self {
        Self {
            grid: [[EMPTY; BOARD_WIDTH]; TOTAL_HEIGHT],
            score: Score::new(),
            blocks_placed: 0,
            attacks_waiting: 0,
            outgoing_attack_queue: 0,
            frame: 0,
            death_frame: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Get the cell at a position (row, col)
    /// Returns None if out of bounds
    pub fn get(&self, row: i32, col: i32) -> Option<u8> {
        if row < 0 || col < 0 {
            return None;
        }
        let (row, col) = (row as usize, col as usize);
        if row >= TOTAL_HEIGHT || col >= BOARD_WIDTH {
            return None;
        }
        Some(self.grid[row][col])
    }

    /// Set a cell at a position
    /// Returns false if out of bounds
    pub fn set(&mut self, row: i32, col: i32, color: u8) -> bool {
        if row < 0 || col < 0 {
            return false;
        }
        let (row, col) = (row as usize, col as usize);
        if row >= TOTAL_HEIGHT || col >= BOARD_WIDTH {
            return false;
        }
        self.grid[row][col] = color;
        true
    }

    /// In bounds and empty
    pub fn is_free(&self, row: i32, col: i32) -> bool {
        self.get(row, col) == Some(EMPTY)
    }

    pub fn blocks_placed(&self) -> u32 {
        self.blocks_placed
    }

    pub fn attacks_waiting(&self) -> u32 {
        self.attacks_waiting
    }

    pub fn outgoing_attack_queue(&self) -> u32 {
        self.outgoing_attack_queue
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Frames between gravity steps at the current level
    pub fn fall_frames(&self) -> u32 {
        self.score.fall_frames()
    }

    pub fn is_dead(&self) -> bool {
        self.death_frame.is_some()
    }

    pub fn death_frame(&self) -> Option<u64> {
        self.death_frame
    }

    /// Advance the board clock by one frame while alive
    pub fn tick(&mut self) {
        if !self.is_dead() {
            self.frame += 1;
        }
    }

    /// Move the board to its terminal state, keeping the grid for display
    pub fn kill(&mut self) {
        if self.death_frame.is_none() {
            debug!("Board died at frame {}", self.frame);
            self.death_frame = Some(self.frame);
        }
    }

    /// Merge a piece into the grid, clear full rows and run the death check
    pub fn place(&mut self, piece: &Piece) -> Placement {
        if self.is_dead() {
            return Placement::default();
        }

        let color = piece.piece_type.color_index();
        for (row, col) in piece.blocks() {
            self.set(row, col, color);
        }
        self.blocks_placed += 1;

        let cleared = self.clear_lines();
        let points = self.score.add_clear(cleared.len());
        let attack = attack_lines(cleared.len());
        self.outgoing_attack_queue += attack;

        if self.buffer_occupied() {
            self.kill();
        }

        Placement {
            cleared,
            points,
            attack,
        }
    }

    /// Remove full rows, shifting everything above them down
    fn clear_lines(&mut self) -> Vec<ClearedRow> {
        let mut cleared = Vec::new();
        let mut write_row = TOTAL_HEIGHT;

        for read_row in (0..TOTAL_HEIGHT).rev() {
            if self.is_line_full(read_row) {
                cleared.push(ClearedRow {
                    row: read_row,
                    cells: self.grid[read_row],
                });
            } else {
                write_row -= 1;
                if write_row != read_row {
                    self.grid[write_row] = self.grid[read_row];
                }
            }
        }

        // Fill the top with empty rows
        for row in 0..write_row {
            self.grid[row] = [EMPTY; BOARD_WIDTH];
        }

        cleared.reverse();
        cleared
    }

    fn is_line_full(&self, row: usize) -> bool {
        self.grid[row].iter().all(|&cell| cell != EMPTY)
    }

    fn buffer_occupied(&self) -> bool {
        self.grid[..BUFFER_HEIGHT]
            .iter()
            .any(|row| row.iter().any(|&cell| cell != EMPTY))
    }

    /// Push `n` garbage rows in from the bottom, each with a single hole
    pub fn add_line_to_bottom(&mut self, n: usize) {
        if n == 0 || self.is_dead() {
            return;
        }
        let n = n.min(TOTAL_HEIGHT);

        let overflowed = self.grid[..n]
            .iter()
            .any(|row| row.iter().any(|&cell| cell != EMPTY));

        self.grid.copy_within(n.., 0);
        for row in TOTAL_HEIGHT - n..TOTAL_HEIGHT {
            let hole = self.rng.gen_range(0..BOARD_WIDTH);
            let mut garbage = [GARBAGE_COLOR; BOARD_WIDTH];
            garbage[hole] = EMPTY;
            self.grid[row] = garbage;
        }

        if overflowed {
            self.kill();
        }
    }

    /// Add lines owed by opponents to the waiting counter
    pub fn queue_attack(&mut self, lines: u32) {
        self.attacks_waiting += lines;
    }

    /// Apply every waiting attack line, returning how many were drained
    pub fn apply_waiting_attacks(&mut self) -> u32 {
        let lines = self.attacks_waiting;
        if lines == 0 {
            return 0;
        }
        self.attacks_waiting -= lines;
        self.add_line_to_bottom(lines as usize);
        lines
    }

    /// Take the outgoing attack queue, leaving it empty
    pub fn take_outgoing_attacks(&mut self) -> u32 {
        std::mem::take(&mut self.outgoing_attack_queue)
    }

    /// Encode the grid as one hex digit per cell, row-major
    pub fn export_board(&self) -> String {
        export_grid(&self.grid)
    }

    /// Replace the grid with a previously exported one
    ///
    /// On malformed input the current grid is kept untouched.
    pub fn import_board(&mut self, state: &str) -> Result<(), BoardImportError> {
        match decode_grid(state) {
            Ok(grid) => {
                self.grid = grid;
                Ok(())
            }
            Err(e) => {
                warn!("Ignoring malformed board state: {}", e);
                Err(e)
            }
        }
    }

    /// Check if the board is completely empty
    pub fn is_empty(&self) -> bool {
        self.grid.iter().all(|row| row.iter().all(|&cell| cell == EMPTY))
    }
}

/// Encode a grid as one hex digit per cell, row-major
pub fn export_grid(grid: &Grid) -> String {
    grid.iter()
        .flatten()
        .map(|&cell| char::from_digit(cell as u32, 16).unwrap_or('0'))
        .collect()
}

/// Decode an exported board string into a grid
pub fn decode_grid(state: &str) -> Result<Grid, BoardImportError> {
    let actual = state.chars().count();
    if actual != EXPORT_LEN {
        return Err(BoardImportError::WrongLength {
            expected: EXPORT_LEN,
            actual,
        });
    }

    let mut grid = [[EMPTY; BOARD_WIDTH]; TOTAL_HEIGHT];
    for (index, digit) in state.chars().enumerate() {
        let color = digit
            .to_digit(16)
            .ok_or(BoardImportError::InvalidDigit { index, digit })? as u8;
        if color > MAX_COLOR {
            return Err(BoardImportError::ColorOutOfRange { index, color });
        }
        grid[index / BOARD_WIDTH][index % BOARD_WIDTH] = color;
    }
    Ok(grid)
}

/// An exported empty board
pub fn empty_export() -> String {
    "0".repeat(EXPORT_LEN)
}
