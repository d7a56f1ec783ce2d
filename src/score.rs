//! Scoring, leveling and attack tables

use serde::{Deserialize, Serialize};

/// Lines needed to advance one level
pub const LINES_PER_LEVEL: u32 = 10;
/// Gravity interval at level 1, in frames per row
pub const BASE_FALL_FRAMES: u32 = 48;
/// Frames shaved off the gravity interval per level
pub const FALL_FRAMES_PER_LEVEL: u32 = 5;
/// Fastest gravity interval
pub const MIN_FALL_FRAMES: u32 = 2;

/// Base points for clearing 0-4 lines at once, multiplied by level
const CLEAR_POINTS: [u64; 5] = [0, 100, 300, 500, 800];
/// Lines sent to opponents for clearing 0-4 lines at once
const ATTACK_LINES: [u32; 5] = [0, 0, 1, 2, 4];

/// Running score and line statistics for one board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    /// Current score
    pub points: u64,
    /// Clears by size: singles, doubles, triples, tetrises
    pub clears: [u32; 4],
    /// Total lines cleared
    pub lines: u32,
    /// Current level
    pub level: u32,
    /// Total lines at which the next level begins
    pub next_level_lines: u32,
}

impl Default for Score {
    fn default() -> Self {
        Self::new()
    }
}

impl Score {
    pub fn new() -> Self {
        Self {
            points: 0,
            clears: [0; 4],
            lines: 0,
            level: 1,
            next_level_lines: LINES_PER_LEVEL,
        }
    }

    /// Record a placement that cleared `lines` rows, returning the points awarded
    pub fn add_clear(&mut self, lines: usize) -> u64 {
        if lines == 0 {
            return 0;
        }
        let lines = lines.min(4);
        let points = CLEAR_POINTS[lines] * self.level as u64;

        self.clears[lines - 1] += 1;
        self.lines += lines as u32;
        self.points += points;

        while self.lines >= self.next_level_lines {
            self.level += 1;
            self.next_level_lines += LINES_PER_LEVEL;
        }
        points
    }

    /// Add score for user-driven soft drop (1 point per row)
    pub fn add_soft_drop(&mut self, rows: u32) {
        self.points += rows as u64;
    }

    /// Add score for hard drop (1 point per row skipped)
    pub fn add_hard_drop(&mut self, rows: u32) {
        self.points += rows as u64;
    }

    pub fn singles(&self) -> u32 {
        self.clears[0]
    }

    pub fn doubles(&self) -> u32 {
        self.clears[1]
    }

    pub fn triples(&self) -> u32 {
        self.clears[2]
    }

    pub fn tetrises(&self) -> u32 {
        self.clears[3]
    }

    /// Frames between automatic one-row drops at the current level
    pub fn fall_frames(&self) -> u32 {
        fall_frames(self.level)
    }
}

/// Gravity interval for a level, never below `MIN_FALL_FRAMES`
pub fn fall_frames(level: u32) -> u32 {
    let shaved = level.saturating_sub(1).saturating_mul(FALL_FRAMES_PER_LEVEL);
    BASE_FALL_FRAMES.saturating_sub(shaved).max(MIN_FALL_FRAMES)
}

/// Garbage lines a clear of `lines` rows sends to every opponent
pub fn attack_lines(lines: usize) -> u32 {
    ATTACK_LINES[lines.min(4)]
}
